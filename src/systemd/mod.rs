//! systemd-specific implementations.
//!
//! kanata usually runs as a systemd unit.  When it restarts the old socket
//! is gone and nothing tells the client a new one is listening, so this
//! module watches the manager's `JobRemoved` signal ([`bus`]) and turns a
//! finished start job into a reconnect request ([`monitor`]).

pub mod bus;
pub mod monitor;

/// Escape a unit name the way systemd does for its object paths.
///
/// ASCII letters and digits are kept, every other byte becomes `_xx` in
/// lowercase hex, a leading digit is escaped too, and the empty string maps
/// to `_`.
///
/// ```
/// use kanata_indicator::systemd::unit_path_suffix;
/// assert_eq!(unit_path_suffix("kanata.service"), "kanata_2eservice");
/// ```
pub fn unit_path_suffix(unit_name: &str) -> String {
    if unit_name.is_empty() {
        return "_".into();
    }
    let mut out = String::with_capacity(unit_name.len());
    for (i, b) in unit_name.bytes().enumerate() {
        let keep = b.is_ascii_alphabetic() || (b.is_ascii_digit() && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02x}", b));
        }
    }
    out
}
