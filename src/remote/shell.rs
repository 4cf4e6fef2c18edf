//! Building shell command lines.

use super::Connection;

/// Quote `s` as a single POSIX shell word.
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The command line to hand to a shell on the target: environment first,
/// then sudo if the connection switches users.
pub(crate) fn wrap(conn: &Connection, command: &str) -> String {
    let inner = if conn.env.is_empty() {
        command.to_string()
    } else {
        let assignments: Vec<String> = conn
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote(value)))
            .collect();
        format!("env {} {}", assignments.join(" "), command)
    };

    match &conn.sudo_user {
        Some(user) => format!("sudo -H -u {} bash -c {}", quote(user), quote(&inner)),
        None => inner,
    }
}
