//! Physical and logical naming.
//!
//! Physical names (bucket name, function name) come from a [`NamingPolicy`]
//! handed to the builder. The default policy, [`DatedNaming`], appends a date
//! captured once at construction, so the same identifier yields a new name on
//! a different day.

use chrono::{NaiveDate, Utc};

use super::types::{ConstructId, ResourceKind};

/// Longest physical name any policy output is truncated to (S3 bucket limit).
pub const MAX_NAME_LEN: usize = 63;

/// Upper bound on the alphanumeric part of a logical id.
const MAX_LOGICAL_PREFIX: usize = 240;

/// Maps a construct identifier and resource kind to a physical name.
pub trait NamingPolicy {
    fn physical_name(&self, construct_id: &ConstructId, kind: ResourceKind) -> String;
}

impl<F> NamingPolicy for F
where
    F: Fn(&ConstructId, ResourceKind) -> String,
{
    fn physical_name(&self, construct_id: &ConstructId, kind: ResourceKind) -> String {
        self(construct_id, kind)
    }
}

/// `{id}-{kind}-{YYYYMMDD}`, lowercased and sanitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatedNaming {
    date: NaiveDate,
}

impl DatedNaming {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Capture today's UTC date.
    pub fn today() -> Self {
        Self::new(Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl NamingPolicy for DatedNaming {
    fn physical_name(&self, construct_id: &ConstructId, kind: ResourceKind) -> String {
        let suffix = format!("-{}-{}", kind.name_label(), self.date.format("%Y%m%d"));
        let stem = name_stem(construct_id.as_str(), MAX_NAME_LEN - suffix.len());
        format!("{}{}", stem, suffix)
    }
}

/// Length of the identifier digest appended by [`name_stem`].
const STEM_DIGEST_LEN: usize = 8;

/// Identifier part of a physical name, at most `max_len` characters.
///
/// An identifier that is already a clean lowercase name and fits is used
/// as is. Anything that sanitizing or truncation would alter gets a short
/// BLAKE3 digest of the raw identifier, so `Demo`, `demo`, `my_app` and
/// `my.app` stay distinct.
fn name_stem(id: &str, max_len: usize) -> String {
    let clean = sanitize_name(id, usize::MAX);
    if clean == id && clean.len() <= max_len {
        return clean;
    }
    let digest = blake3::hash(id.as_bytes()).to_hex();
    let digest = &digest[..STEM_DIGEST_LEN];
    let mut head = clean;
    head.truncate(max_len.saturating_sub(STEM_DIGEST_LEN + 1));
    while head.ends_with('-') {
        head.pop();
    }
    if head.is_empty() {
        digest.to_string()
    } else {
        format!("{}-{}", head, digest)
    }
}

/// Lowercase `raw`, collapse every run of characters outside `[a-z0-9]` into a
/// single `-`, drop leading and trailing dashes, and cap the length.
pub fn sanitize_name(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    // All remaining characters are ASCII, so byte truncation is safe.
    out.truncate(max_len);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Template key for a construct path: its ASCII alphanumerics followed by the
/// first eight hex digits (uppercase) of the path's BLAKE3 digest.
pub fn logical_id(path: &str) -> String {
    let mut prefix: String = path.chars().filter(char::is_ascii_alphanumeric).collect();
    prefix.truncate(MAX_LOGICAL_PREFIX);
    let digest = blake3::hash(path.as_bytes()).to_hex();
    format!("{}{}", prefix, digest[..8].to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_dated_naming_clean_id_is_kept() {
        let naming = DatedNaming::new(fixed_date());
        let id = ConstructId::new("demo").unwrap();
        assert_eq!(
            naming.physical_name(&id, ResourceKind::Bucket),
            "demo-bucket-20261018"
        );
        assert_eq!(
            naming.physical_name(&id, ResourceKind::Function),
            "demo-lambda-20261018"
        );
    }

    #[test]
    fn test_dated_naming_mixed_case_gets_digest() {
        let naming = DatedNaming::new(fixed_date());
        let name = naming.physical_name(&ConstructId::new("Demo").unwrap(), ResourceKind::Bucket);
        assert!(name.starts_with("demo-"), "{name}");
        assert!(name.ends_with("-bucket-20261018"), "{name}");
        assert_eq!(name.len(), "demo-".len() + 8 + "-bucket-20261018".len());
        assert_eq!(name.to_lowercase(), name);
    }

    #[test]
    fn test_case_and_punctuation_variants_do_not_collide() {
        let naming = DatedNaming::new(fixed_date());
        let ids = ["Demo", "demo", "DEMO", "My_App", "my.app", "My-App", "my-app", "my--app"];
        let names: Vec<String> = ids
            .iter()
            .map(|id| naming.physical_name(&ConstructId::new(*id).unwrap(), ResourceKind::Bucket))
            .collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b, "{names:?}");
            }
        }
    }

    #[test]
    fn test_long_identifier_keeps_label_and_date() {
        let naming = DatedNaming::new(fixed_date());
        let alpha = format!("{}Alpha", "x".repeat(60));
        let beta = format!("{}Beta", "x".repeat(60));
        for kind in [ResourceKind::Bucket, ResourceKind::Function] {
            let a = naming.physical_name(&ConstructId::new(alpha.as_str()).unwrap(), kind);
            let b = naming.physical_name(&ConstructId::new(beta.as_str()).unwrap(), kind);
            assert!(a.len() <= MAX_NAME_LEN, "{a}");
            assert!(a.ends_with(&format!("-{}-20261018", kind.name_label())), "{a}");
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_long_clean_identifier_is_truncated_with_digest() {
        let naming = DatedNaming::new(fixed_date());
        let a = "a".repeat(70);
        let b = format!("{}b", "a".repeat(69));
        let na = naming.physical_name(&ConstructId::new(a).unwrap(), ResourceKind::Bucket);
        let nb = naming.physical_name(&ConstructId::new(b).unwrap(), ResourceKind::Bucket);
        assert_eq!(na.len(), MAX_NAME_LEN);
        assert!(na.ends_with("-bucket-20261018"));
        assert_ne!(na, nb);
    }

    #[test]
    fn test_all_punctuation_identifier() {
        let naming = DatedNaming::new(fixed_date());
        let name = naming.physical_name(&ConstructId::new("___").unwrap(), ResourceKind::Bucket);
        assert_eq!(name.len(), 8 + "-bucket-20261018".len());
        assert!(name.ends_with("-bucket-20261018"));
        assert!(!name.starts_with('-'));
    }

    #[test]
    fn test_dated_naming_deterministic() {
        let a = DatedNaming::new(fixed_date());
        let b = DatedNaming::new(fixed_date());
        let id = ConstructId::new("Demo").unwrap();
        assert_eq!(
            a.physical_name(&id, ResourceKind::Bucket),
            b.physical_name(&id, ResourceKind::Bucket)
        );
    }

    #[test]
    fn test_dated_naming_rotates_across_days() {
        let id = ConstructId::new("Demo").unwrap();
        let today = DatedNaming::new(fixed_date());
        let tomorrow = DatedNaming::new(fixed_date().succ_opt().unwrap());
        assert_ne!(
            today.physical_name(&id, ResourceKind::Bucket),
            tomorrow.physical_name(&id, ResourceKind::Bucket)
        );
    }

    #[test]
    fn test_closure_policy() {
        let policy = |id: &ConstructId, kind: ResourceKind| {
            format!("{}-{}", id.as_str().to_lowercase(), kind.name_label())
        };
        let id = ConstructId::new("Demo").unwrap();
        assert_eq!(policy.physical_name(&id, ResourceKind::Bucket), "demo-bucket");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My_Stack--Bucket", 63), "my-stack-bucket");
        assert_eq!(sanitize_name("--Edge--", 63), "edge");
        assert_eq!(sanitize_name("Ünïcode Name", 63), "n-code-name");
        assert_eq!(sanitize_name("abcdef-ghi", 7), "abcdef");
    }

    #[test]
    fn test_logical_id_shape() {
        let id = logical_id("Demo-API-Gateway");
        assert!(id.starts_with("DemoAPIGateway"));
        assert_eq!(id.len(), "DemoAPIGateway".len() + 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(id, logical_id("Demo-API-Gateway"));
    }

    #[test]
    fn test_logical_id_distinguishes_punctuation() {
        // Same alphanumerics, different paths.
        assert_ne!(logical_id("A-B"), logical_id("AB"));
    }

    proptest! {
        #[test]
        fn prop_dated_names_are_valid_lowercase(id in "[A-Za-z][A-Za-z0-9_ .-]{0,80}") {
            let naming = DatedNaming::new(fixed_date());
            let cid = ConstructId::new(id).unwrap();
            for kind in [ResourceKind::Bucket, ResourceKind::Function] {
                let name = naming.physical_name(&cid, kind);
                prop_assert!(name.len() >= 3 && name.len() <= MAX_NAME_LEN);
                prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
                prop_assert!(!name.starts_with('-') && !name.ends_with('-'));
                prop_assert!(!name.contains("--"));
            }
        }

        #[test]
        fn prop_distinct_ids_get_distinct_bucket_names(
            a in "[A-Za-z0-9][A-Za-z0-9_.-]{0,90}",
            b in "[A-Za-z0-9][A-Za-z0-9_.-]{0,90}"
        ) {
            prop_assume!(a != b);
            let naming = DatedNaming::new(fixed_date());
            let na = naming.physical_name(&ConstructId::new(a).unwrap(), ResourceKind::Bucket);
            let nb = naming.physical_name(&ConstructId::new(b).unwrap(), ResourceKind::Bucket);
            prop_assert_ne!(na, nb);
        }
    }
}
