//! HMAC signature primitives for the two verification paths: the
//! client-supplied payment confirmation and the server-to-server webhook.
//! The two paths use distinct shared secrets.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Expected signature over a payment confirmation:
/// HMAC-SHA256(`{gateway_order_id}|{gateway_payment_id}`), hex-encoded.
pub fn payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    secret: &str,
) -> String {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    hmac_hex(payload.as_bytes(), secret)
}

/// Verifies a client-supplied payment signature in constant time.
pub fn verify_payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    supplied: &str,
    secret: &str,
) -> bool {
    let expected = payment_signature(gateway_order_id, gateway_payment_id, secret);
    constant_time_eq(&expected, supplied)
}

/// Signature over a raw webhook body, hex-encoded.
pub fn webhook_signature(body: &[u8], secret: &str) -> String {
    hmac_hex(body, secret)
}

/// Verifies a webhook signature over the raw request body in constant time.
pub fn verify_webhook_signature(body: &[u8], supplied: &str, secret: &str) -> bool {
    constant_time_eq(&webhook_signature(body, secret), supplied)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
