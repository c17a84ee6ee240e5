//! Reversible short ids for primary keys exposed in URLs and payloads.

use sqids::Sqids;

use crate::config::SqidConfig;

/// Encodes and decodes numeric primary keys as opaque strings.
#[derive(Debug)]
pub struct SqidCodec {
    inner: Sqids,
}

impl SqidCodec {
    pub fn new(alphabet: &str, min_length: u8) -> Result<Self, sqids::Error> {
        let inner = Sqids::builder()
            .alphabet(alphabet.chars().collect())
            .min_length(min_length)
            .build()?;
        Ok(Self { inner })
    }

    pub fn from_config(config: &SqidConfig) -> Result<Self, sqids::Error> {
        Self::new(&config.alphabet, config.min_length)
    }

    /// Encode a non-negative id. Negative ids never occur for BIGSERIAL keys
    /// and encode as an empty string.
    pub fn encode(&self, id: i64) -> String {
        u64::try_from(id)
            .ok()
            .and_then(|n| self.inner.encode(&[n]).ok())
            .unwrap_or_default()
    }

    /// Decode a sqid back to its id. Only canonical single-number ids are
    /// accepted: the decoded value must re-encode to exactly `sqid`.
    pub fn decode(&self, sqid: &str) -> Option<i64> {
        if sqid.is_empty() {
            return None;
        }
        let numbers = self.inner.decode(sqid);
        let [n] = numbers.as_slice() else {
            return None;
        };
        let id = i64::try_from(*n).ok()?;
        (self.inner.encode(&[*n]).ok()?.as_str() == sqid).then_some(id)
    }

    /// Decode every entry, silently dropping those that are not valid sqids.
    pub fn decode_many<S: AsRef<str>>(&self, sqids: &[S]) -> Vec<i64> {
        sqids.iter().filter_map(|s| self.decode(s.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SqidCodec {
        SqidCodec::from_config(&SqidConfig::default()).unwrap()
    }

    #[test]
    fn encodes_to_min_length_and_back() {
        let codec = codec();
        for id in [1_i64, 2, 42, 1_000_000, i64::MAX] {
            let sqid = codec.encode(id);
            assert!(sqid.len() >= 10, "{sqid} shorter than min length");
            assert_eq!(codec.decode(&sqid), Some(id));
        }
    }

    #[test]
    fn distinct_ids_get_distinct_sqids() {
        let codec = codec();
        assert_ne!(codec.encode(1), codec.encode(2));
    }

    #[test]
    fn rejects_garbage_and_foreign_alphabet() {
        let codec = codec();
        assert_eq!(codec.decode(""), None);
        assert_eq!(codec.decode("not-a-sqid!"), None);
        assert_eq!(codec.decode("___"), None);
    }

    #[test]
    fn rejects_non_canonical_and_multi_number_ids() {
        let codec = codec();
        let sqid = codec.encode(7);
        let mutated: String = sqid.chars().rev().collect();
        if mutated != sqid {
            assert_ne!(codec.decode(&mutated), Some(7));
        }

        let pair = codec.inner.encode(&[1, 2]).unwrap();
        assert_eq!(codec.decode(&pair), None);
    }

    #[test]
    fn decode_many_drops_invalid_entries() {
        let codec = codec();
        let input = vec![codec.encode(3), "bogus!".to_string(), codec.encode(9)];
        assert_eq!(codec.decode_many(&input), vec![3, 9]);
    }

    #[test]
    fn custom_alphabet_is_respected() {
        let codec = SqidCodec::new("abcdefghijklmnop", 4).unwrap();
        let sqid = codec.encode(12345);
        assert!(sqid.chars().all(|c| ('a'..='p').contains(&c)));
        assert_eq!(codec.decode(&sqid), Some(12345));
    }
}
