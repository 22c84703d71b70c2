//! Text format of key files
//!
//! ```text
//! metadata
//! curve
//!     public-key = '<hex>'
//!     secret-key = '<hex>'
//! ```
//!
//! The layout follows the certificate files of the phone-side pairing app;
//! only the layout is shared, keys here are hex rather than Z85. Unknown
//! lines are ignored; either quote style is accepted.

use std::fmt::Write as _;

use crate::types::{PublicKey, KEY_LEN};

/// Parsed key file contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub public_key: PublicKey,
    pub secret_key: Option<[u8; KEY_LEN]>,
}

impl KeyRecord {
    pub fn public(public_key: PublicKey) -> Self {
        Self {
            public_key,
            secret_key: None,
        }
    }

    pub fn with_secret(public_key: PublicKey, secret_key: [u8; KEY_LEN]) -> Self {
        Self {
            public_key,
            secret_key: Some(secret_key),
        }
    }

    /// Parse a record, reporting what is wrong as a plain message
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut public_key = None;
        let mut secret_key = None;

        for line in text.lines() {
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());

            match name.trim() {
                "public-key" => {
                    let key = value
                        .parse::<PublicKey>()
                        .map_err(|e| format!("public-key: {}", e))?;
                    public_key = Some(key);
                }
                "secret-key" => {
                    let bytes = hex::decode(value).map_err(|e| format!("secret-key: {}", e))?;
                    let key: [u8; KEY_LEN] = bytes
                        .try_into()
                        .map_err(|_| format!("secret-key: expected {} bytes", KEY_LEN))?;
                    secret_key = Some(key);
                }
                _ => {}
            }
        }

        let public_key = public_key.ok_or_else(|| "missing public-key".to_string())?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::from("metadata\ncurve\n");
        // Writing into a String cannot fail.
        let _ = writeln!(out, "    public-key = '{}'", self.public_key.to_hex());
        if let Some(secret) = &self.secret_key {
            let _ = writeln!(out, "    secret-key = '{}'", hex::encode(secret));
        }
        out
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_then_parse() {
        let record = KeyRecord::with_secret(PublicKey::new([5; KEY_LEN]), [6; KEY_LEN]);
        assert_eq!(KeyRecord::parse(&record.render()).unwrap(), record);

        let public = KeyRecord::public(PublicKey::new([5; KEY_LEN]));
        let text = public.render();
        assert!(!text.contains("secret-key"));
        assert_eq!(KeyRecord::parse(&text).unwrap(), public);
    }

    #[test]
    fn test_parse_accepts_foreign_layout() {
        let key = PublicKey::new([0x11; KEY_LEN]);
        let text = format!(
            "#   ****  Generated by the phone  ****\nmetadata\n    name = \"pixel\"\ncurve\n  public-key=\"{}\"  \n",
            key.to_hex()
        );
        let record = KeyRecord::parse(&text).unwrap();
        assert_eq!(record.public_key, key);
        assert_eq!(record.secret_key, None);
    }

    #[test]
    fn test_parse_rejects_broken_records() {
        assert!(KeyRecord::parse("metadata\ncurve\n").is_err());
        assert!(KeyRecord::parse("    public-key = 'abc'\n").is_err());
        let key = PublicKey::new([1; KEY_LEN]).to_hex();
        assert!(KeyRecord::parse(&format!("public-key = '{}'\nsecret-key = '00'\n", key)).is_err());
    }
}
