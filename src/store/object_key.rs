use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::aspect::AspectCategory;

const TOKEN_BYTES: usize = 32;
const TOKEN_LEN: usize = 43;
const EXTENSION: &str = ".mp4";

/// Location of an uploaded video inside the bucket: `{category}/{token}.mp4`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ObjectKey {
    category: AspectCategory,
    token: String,
}

impl ObjectKey {
    pub(crate) fn generate(category: AspectCategory) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);

        ObjectKey {
            category,
            token: BASE64_URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        let (category, file) = s.split_once('/')?;

        let category = AspectCategory::from_name(category)?;
        let token = file.strip_suffix(EXTENSION)?;

        let valid_token = token.len() == TOKEN_LEN
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if !valid_token {
            return None;
        }

        Some(ObjectKey {
            category,
            token: token.to_string(),
        })
    }

    pub(crate) fn category(&self) -> AspectCategory {
        self.category
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}{EXTENSION}", self.category, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectKey;
    use crate::aspect::AspectCategory;

    fn assert_key_shape(key: &str) {
        let (category, file) = key.split_once('/').expect("Has a category");
        assert!(["landscape", "portrait", "other"].contains(&category));

        let token = file.strip_suffix(".mp4").expect("Has extension");
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn generated_keys_have_expected_shape() {
        for category in [
            AspectCategory::Landscape,
            AspectCategory::Portrait,
            AspectCategory::Other,
        ] {
            let key = ObjectKey::generate(category);

            assert_eq!(key.category(), category);
            assert_key_shape(&key.to_string());
        }
    }

    #[test]
    fn generated_keys_differ() {
        let keys = (0..64)
            .map(|_| ObjectKey::generate(AspectCategory::Landscape).to_string())
            .collect::<std::collections::HashSet<_>>();

        assert_eq!(keys.len(), 64);
    }

    #[test]
    fn parse_generated_key() {
        let key = ObjectKey::generate(AspectCategory::Portrait);

        assert_eq!(ObjectKey::parse(&key.to_string()), Some(key));
    }

    #[test]
    fn reject_malformed_keys() {
        let token = "a".repeat(43);

        for bad in [
            format!("square/{token}.mp4"),
            format!("landscape/{token}.mov"),
            format!("landscape/{}.mp4", "a".repeat(42)),
            format!("landscape/{}.mp4", "a/".repeat(22)),
            String::from("landscape"),
            format!("/landscape/{token}.mp4"),
        ] {
            assert_eq!(ObjectKey::parse(&bad), None, "{bad}");
        }
    }
}
