use std::fmt;

use regex::Regex;

/// Username and password pulled out of a JAAS login module line.
///
/// Only the `username="..."` and `password="..."` options are read; the
/// login module class and any other options are ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct JaasCredentials {
    pub username: String,
    pub password: String,
}

impl JaasCredentials {
    /// Parse credentials, returning `None` unless both options are present.
    pub fn parse(jaas_config: &str) -> Option<Self> {
        let re = Regex::new(r#"(\w+)\s*=\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex");

        let mut username = None;
        let mut password = None;
        for caps in re.captures_iter(jaas_config) {
            let value = caps[2].replace("\\\"", "\"").replace("\\\\", "\\");
            match &caps[1] {
                "username" => username = Some(value),
                "password" => password = Some(value),
                _ => {}
            }
        }

        Some(Self {
            username: username?,
            password: password?,
        })
    }
}

impl fmt::Debug for JaasCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JaasCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_login_module() {
        let jaas = r#"org.apache.kafka.common.security.plain.PlainLoginModule required username="alice" password="alice-secret";"#;
        let creds = JaasCredentials::parse(jaas).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "alice-secret");
    }

    #[test]
    fn test_parse_tolerates_spacing_and_order() {
        let jaas = r#"ScramLoginModule required password = "p@ss;word"   username="svc";"#;
        let creds = JaasCredentials::parse(jaas).unwrap();
        assert_eq!(creds.username, "svc");
        assert_eq!(creds.password, "p@ss;word");
    }

    #[test]
    fn test_parse_escaped_quote() {
        let jaas = r#"PlainLoginModule required username="bob" password="a\"b";"#;
        let creds = JaasCredentials::parse(jaas).unwrap();
        assert_eq!(creds.password, "a\"b");
    }

    #[test]
    fn test_parse_missing_password() {
        assert!(JaasCredentials::parse(r#"PlainLoginModule required username="bob";"#).is_none());
        assert!(JaasCredentials::parse("").is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = JaasCredentials {
            username: "u".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}
