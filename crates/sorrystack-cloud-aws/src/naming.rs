//! Logical id allocation
//!
//! Every resource is addressed by a construct path relative to the stack
//! (e.g. `["Vpc", "PublicSubnet1", "Subnet"]`). A single-component path is
//! used as-is; longer paths get a readable prefix plus a short hash of the
//! full path so that ids stay unique and stable.

use sha2::{Digest, Sha256};

/// Component that is dropped from both the readable part and the hash
const HIDDEN_ID: &str = "Default";

/// Component that is dropped from the readable part only
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

const HASH_LEN: usize = 8;

/// CloudFormation limit for logical ids
const MAX_ID_LEN: usize = 255;

/// Allocate the logical id for a construct path
pub fn logical_id(path: &[&str]) -> String {
    let components: Vec<&str> = path
        .iter()
        .copied()
        .filter(|c| !c.is_empty() && *c != HIDDEN_ID)
        .collect();

    if let [only] = components.as_slice() {
        let candidate = alphanumeric(only);
        if !candidate.is_empty() && candidate.len() <= MAX_ID_LEN {
            return candidate;
        }
    }

    let hash = path_hash(&components);
    let mut human = String::new();
    let mut previous: Option<&str> = None;
    for component in &components {
        if *component == HIDDEN_FROM_HUMAN_ID || previous == Some(*component) {
            previous = Some(*component);
            continue;
        }
        human.push_str(&alphanumeric(component));
        previous = Some(*component);
    }

    if human.len() > MAX_ID_LEN - HASH_LEN {
        human.truncate(MAX_ID_LEN - HASH_LEN);
    }
    format!("{human}{hash}")
}

fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join("/").as_bytes());
    hex::encode_upper(digest)[..HASH_LEN].to_string()
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_only_component_is_hashed() {
        let id = logical_id(&["-"]);
        assert_eq!(id.len(), HASH_LEN);
        assert_ne!(id, logical_id(&["--"]));
    }

    #[test]
    fn test_single_component_is_verbatim() {
        assert_eq!(logical_id(&["OriginAccessControl"]), "OriginAccessControl");
        assert_eq!(logical_id(&["sorry-page-bucket"]), "sorrypagebucket");
    }

    #[test]
    fn test_resource_and_default_are_hidden() {
        let id = logical_id(&["Vpc", "Resource"]);
        assert!(id.starts_with("Vpc"));
        assert_eq!(id.len(), "Vpc".len() + HASH_LEN);

        // Default is dropped from both the readable part and the hash
        assert_eq!(
            logical_id(&["Deploy", "CustomResource", "Default"]),
            logical_id(&["Deploy", "CustomResource"])
        );
    }

    #[test]
    fn test_distinct_paths_get_distinct_ids() {
        let a = logical_id(&["Vpc", "PublicSubnet1", "Subnet"]);
        let b = logical_id(&["Vpc", "PublicSubnet1", "RouteTable"]);
        let c = logical_id(&["VpcPublicSubnet1", "Subnet"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("VpcPublicSubnet1Subnet"));
    }

    #[test]
    fn test_ids_are_stable() {
        let path = ["SampleWebService", "LB", "Resource"];
        assert_eq!(logical_id(&path), logical_id(&path));
        assert!(
            logical_id(&path)
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        );
    }

    #[test]
    fn test_long_paths_are_truncated() {
        let long = "a".repeat(300);
        let id = logical_id(&[long.as_str(), "Child"]);
        assert_eq!(id.len(), MAX_ID_LEN);
    }
}
