use std::fmt;

/// A single command sent by a terminal.
///
/// Arguments are kept as received, validating them is up to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Hello(String),
    Pass(String),
    Balance,
    Withdraw(String),
    Bye,
    Malformed,
}

impl Request {
    /// Parses a single line, never fails
    ///
    /// keywords are case sensitive and must carry exactly the expected
    /// number of arguments, anything else is `Malformed`.
    pub fn from_line(line: &str) -> Self {
        let mut parts = line.split_ascii_whitespace();
        let Some(method) = parts.next() else {
            return Self::Malformed;
        };

        let argument = parts.next().map(str::to_owned);

        // make sure we've consumed the entire line
        if parts.next().is_some() {
            return Self::Malformed;
        }

        match (method, argument) {
            ("HELO", Some(id)) => Self::Hello(id),
            ("PASS", Some(password)) => Self::Pass(password),
            ("BALA", None) => Self::Balance,
            ("WDRA", Some(amount)) => Self::Withdraw(amount),
            ("BYE", None) => Self::Bye,
            _ => Self::Malformed,
        }
    }
}

/// A single reply line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    AuthRequired,
    Authenticated,
    Amount(u64),
    Withdrawn,
    Error,
    Bye,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthRequired => f.write_str("500 AUTH REQUIRED!"),
            Self::Authenticated => f.write_str("525 OK!"),
            Self::Amount(balance) => write!(f, "AMNT:{}", balance),
            // no exclamation mark here, existing terminals match on it
            Self::Withdrawn => f.write_str("525 OK"),
            Self::Error => f.write_str("401 ERROR!"),
            Self::Bye => f.write_str("BYE"),
        }
    }
}
