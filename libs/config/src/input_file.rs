//! Line-oriented `key=value` input files
//!
//! Blank lines and lines starting with `#` are skipped, as is any line
//! without `=`. The key is everything before the first `=`, the value
//! everything after it, kept verbatim so messages may contain spaces or
//! further `=` signs.

/// Iterate the `(key, value)` pairs of an input file
pub fn pairs(contents: &str) -> impl Iterator<Item = (&str, &str)> {
    contents.lines().filter_map(|line| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        line.split_once('=').map(|(key, value)| (key.trim(), value))
    })
}

/// Integer flag: true when the leading integer is non-zero
///
/// Non-numeric input reads as zero, so `tls=yes` leaves TLS off.
pub fn flag(value: &str) -> bool {
    let value = value.trim_start();
    let digits = value
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(value);
    digits
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .any(|c| c != '0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_pairs_skip_comments_blanks_and_bare_lines() {
        let input = "# comment\n\nmode=unix\nno equals here\naddress=/tmp/a.sock\r\nmessage=a=b c\n";
        let parsed: Vec<_> = pairs(input).collect();
        assert_eq!(
            parsed,
            vec![
                ("mode", "unix"),
                ("address", "/tmp/a.sock"),
                ("message", "a=b c")
            ]
        );
    }

    #[rstest]
    #[case("1", true)]
    #[case("0", false)]
    #[case("2", true)]
    #[case("00", false)]
    #[case(" 1", true)]
    #[case("-1", true)]
    #[case("1abc", true)]
    #[case("yes", false)]
    #[case("", false)]
    fn test_flag(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(flag(value), expected);
    }
}
