//! Filename helpers for legacy test members and task archives.
//!
//! Legacy member names carry a 5-tuple:
//! `20170320T23:53:10Z-98.162.212.214-53849-64.86.132.75-42677.paris`
//! (timestamp, destination ip, destination port, server ip, server port).
//! Task file names embed a machine/site token like `mlab1-atl06`, from
//! which the metro code is derived.

use chrono::DateTime;

/// Pieces recovered from a legacy member file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFileName {
    pub date: String,
    pub destination_ip: String,
    pub destination_port: String,
    pub server_ip: String,
    pub server_port: String,
}

impl LegacyFileName {
    /// Split the 5-tuple out of a member name. Returns `None` when the name
    /// does not have the expected shape; callers treat that as "no filename
    /// metadata" rather than an error.
    pub fn parse(name: &str) -> Option<Self> {
        let base = name.rsplit('/').next().unwrap_or(name);
        let mut parts = base.splitn(5, '-');
        let date = parts.next()?;
        let destination_ip = parts.next()?;
        let destination_port = parts.next()?;
        let server_ip = parts.next()?;
        let tail = parts.next()?;
        // Tail is "<port>.<suffix>"; the port ends at the last dot.
        let dot = tail.rfind('.')?;
        if date.len() < 18 || !date.is_ascii() {
            return None;
        }
        Some(Self {
            date: date.to_string(),
            destination_ip: destination_ip.to_string(),
            destination_port: destination_port.to_string(),
            server_ip: server_ip.to_string(),
            server_port: tail[..dot].to_string(),
        })
    }

    /// Unix seconds from the compact timestamp (`20170320T23:53:10Z`).
    /// A malformed date yields 0, never an error.
    pub fn log_time(&self) -> i64 {
        // Byte-offset slicing is only safe on ASCII dates.
        if self.date.len() < 18 || !self.date.is_ascii() {
            return 0;
        }
        // Rewrite to RFC3339 by inserting the date dashes.
        let revised = format!(
            "{}-{}-{}",
            &self.date[0..4],
            &self.date[4..6],
            &self.date[6..]
        );
        match DateTime::parse_from_rfc3339(&revised) {
            Ok(t) => t.timestamp(),
            Err(_) => 0,
        }
    }
}

/// Metro code from a task file name: the leading three letters of the site
/// token following the `mlab<N>` machine token. Empty when absent.
pub fn metro_code(task_file_name: &str) -> String {
    let base = task_file_name.rsplit('/').next().unwrap_or(task_file_name);
    let mut parts = base.split('-');
    while let Some(part) = parts.next() {
        if part.starts_with("mlab") {
            if let Some(site) = parts.next() {
                return site.chars().take(3).collect();
            }
        }
    }
    String::new()
}

/// Synthetic test identifier: the task's date path (`YYYY/MM/DD`) joined
/// with the member's base name. Falls back to the bare member name when the
/// task name carries no timestamp.
pub fn synthetic_test_id(task_file_name: &str, test_name: &str) -> String {
    let member = test_name.rsplit('/').next().unwrap_or(test_name);
    let task_base = task_file_name.rsplit('/').next().unwrap_or(task_file_name);
    let stamp: String = task_base.chars().take(8).collect();
    if stamp.len() == 8 && stamp.chars().all(|c| c.is_ascii_digit()) {
        format!("{}/{}/{}/{}", &stamp[0..4], &stamp[4..6], &stamp[6..8], member)
    } else {
        member.to_string()
    }
}
