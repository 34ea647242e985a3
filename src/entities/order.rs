use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub order_number: String,

    pub buyer_name: String,
    #[validate(email(message = "Buyer email must be a valid email address"))]
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    /// Registered customer, if the buyer was signed in
    pub customer_id: Option<Uuid>,

    pub status: OrderStatus,

    /// Total in minor currency units (e.g. paise); integral to avoid rounding
    pub amount_minor: i64,
    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,

    /// Remote order id minted by the payment gateway; write-once at intake
    pub gateway_order_id: Option<String>,
    /// Gateway payment id; known only once the order is captured
    pub gateway_payment_id: Option<String>,

    /// Audit counter for duplicate confirmation/webhook deliveries observed
    /// after the order reached a terminal state
    pub duplicate_event_count: i32,
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

/// Order lifecycle state. `Captured` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "captured")]
    Captured,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Captured | OrderStatus::Failed)
    }

    /// State-machine guard: only `Created` orders may transition.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Created, OrderStatus::Captured)
                | (OrderStatus::Created, OrderStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Captured => "captured",
            OrderStatus::Failed => "failed",
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_is_the_only_transitionable_state() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Captured));
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Created));
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        for terminal in [OrderStatus::Captured, OrderStatus::Failed] {
            assert!(terminal.is_terminal());
            for target in [
                OrderStatus::Created,
                OrderStatus::Captured,
                OrderStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!OrderStatus::Created.is_terminal());
    }
}
