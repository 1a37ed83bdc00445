/// Log-safe form of an e-mail: first three characters of the local part plus the domain.
pub fn redact_email(email: &str) -> String {
    if email.is_empty() {
        return "unknown".to_string();
    }
    match email.split_once('@') {
        Some((user, domain)) => format!("{}***@{}", first_chars(user, 3), domain),
        None => format!("{}***", first_chars(email, 3)),
    }
}

/// Six-character preview of a session token for debug logs.
pub fn token_preview(token: &str) -> String {
    format!("{}...", first_chars(token, 6))
}

fn first_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
