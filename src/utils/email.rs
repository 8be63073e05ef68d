use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static EMAIL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)+$")
        .expect("Email regex invalid")
});

/// A syntactically valid email address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EmailAddress {
    type Error = InvalidEmailAddress;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = InvalidEmailAddress;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if EMAIL_REGEX.is_match(&s) {
            Ok(Self(s))
        } else {
            Err(InvalidEmailAddress)
        }
    }
}

impl From<EmailAddress> for String {
    fn from(addr: EmailAddress) -> Self {
        let EmailAddress(s) = addr;
        s
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Not a valid email address")]
pub struct InvalidEmailAddress;

#[cfg(test)]
mod tests {
    use super::EmailAddress;

    #[test]
    fn accepts_plain_addresses() {
        assert!(EmailAddress::try_from("buyer@records.example").is_ok());
        assert!(EmailAddress::try_from("a.b+tag@shop.co.uk").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(EmailAddress::try_from("not-an-email").is_err());
        assert!(EmailAddress::try_from("missing@tld").is_err());
        assert!(EmailAddress::try_from("@nobody.example").is_err());
    }
}
