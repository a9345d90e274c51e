use core::fmt::{self, Display, Formatter};

/// A command line received from an SMTP client.
///
/// The verb is matched case-insensitively. MAIL and RCPT arguments are taken
/// verbatim after stripping the literal `MAIL FROM:<` / `RCPT TO:<` prefix and
/// a trailing `>`; no address validation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Quit,
    /// Only the bare `STARTTLS` line, in any case.
    StartTls,
    Invalid(String),
}

impl Command {
    /// The first whitespace-separated token, uppercased.
    pub fn verb(line: &str) -> Option<String> {
        line.split_whitespace()
            .next()
            .map(str::to_ascii_uppercase)
    }

    fn argument(line: &str, prefix: &str) -> String {
        let rest = line.strip_prefix(prefix).unwrap_or(line);
        rest.strip_suffix('>').unwrap_or(rest).to_string()
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        if line.eq_ignore_ascii_case("STARTTLS") {
            return Self::StartTls;
        }

        let Some(verb) = Self::verb(line) else {
            return Self::Invalid(line.to_string());
        };

        let rest = || {
            line.trim_start()
                .get(verb.len()..)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        match verb.as_str() {
            "HELO" => Self::Helo(rest()),
            "EHLO" => Self::Ehlo(rest()),
            "MAIL" => Self::MailFrom(Self::argument(line, "MAIL FROM:<")),
            "RCPT" => Self::RcptTo(Self::argument(line, "RCPT TO:<")),
            "DATA" => Self::Data,
            "QUIT" => Self::Quit,
            _ => Self::Invalid(line.to_string()),
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(id) => write!(fmt, "HELO {id}"),
            Self::Ehlo(id) => write!(fmt, "EHLO {id}"),
            Self::MailFrom(from) => write!(fmt, "MAIL FROM:<{from}>"),
            Self::RcptTo(to) => write!(fmt, "RCPT TO:<{to}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::StartTls => fmt.write_str("STARTTLS"),
            Self::Invalid(line) => fmt.write_str(line),
        }
    }
}
