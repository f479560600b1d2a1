//! Trace and span id generation

use rand::Rng;

const URL_SAFE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const TRACE_ID_LEN: usize = 21;
const SPAN_ID_LEN: usize = 16;

fn random_url_safe(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())] as char)
        .collect()
}

/// New trace id, `tr_` followed by 21 URL-safe characters
pub fn generate_trace_id() -> String {
    format!("tr_{}", random_url_safe(TRACE_ID_LEN))
}

/// New span id, `sp_` followed by 16 URL-safe characters
pub fn generate_span_id() -> String {
    format!("sp_{}", random_url_safe(SPAN_ID_LEN))
}
