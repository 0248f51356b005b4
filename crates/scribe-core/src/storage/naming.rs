//! Database naming
//!
//! Primary stores are named deterministically from the user id. Secondary
//! index databases carry the name of their primary store followed by
//! [`INDEX_MARKER`] and the index name.

use crate::models::User;

/// Prefix shared by every primary store
pub const STORE_PREFIX: &str = "creative-writer-stories";

/// Separator between a primary store name and its index name
pub const INDEX_MARKER: &str = "-mrview-";

/// Name of the local (and remote) store for a user
pub fn store_name(user: &User) -> String {
    if user.is_anonymous {
        return format!("{}-anonymous", STORE_PREFIX);
    }
    format!("{}-{}", STORE_PREFIX, sanitize(&user.id))
}

/// Name of the index database `index` derived from `store`
pub fn index_db_name(store: &str, index: &str) -> String {
    format!("{}{}{}", store, INDEX_MARKER, index)
}

/// Split an index database name into `(primary store, index name)`
///
/// Returns `None` for anything that is not recognizably a secondary index.
pub fn parse_index_db_name(name: &str) -> Option<(&str, &str)> {
    let (store, index) = name.rsplit_once(INDEX_MARKER)?;
    if store.is_empty() || index.is_empty() {
        return None;
    }
    Some((store, index))
}

/// Lowercase and restrict to characters the remote accepts in database names
///
/// The result never contains [`INDEX_MARKER`], so a primary store name can
/// not be mistaken for a secondary index.
fn sanitize(id: &str) -> String {
    let mut sanitized: String = id
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '$' | '(' | ')' | '+' | '-' => c,
            _ => '_',
        })
        .collect();

    while sanitized.contains(INDEX_MARKER) {
        sanitized = sanitized.replace(INDEX_MARKER, "_mrview_");
    }

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_name_for_user() {
        assert_eq!(
            store_name(&User::new("alice")),
            "creative-writer-stories-alice"
        );
    }

    #[test]
    fn test_store_name_for_anonymous() {
        assert_eq!(
            store_name(&User::anonymous()),
            "creative-writer-stories-anonymous"
        );
    }

    #[test]
    fn test_store_name_sanitizes() {
        assert_eq!(
            store_name(&User::new("Bob.Smith@Example")),
            "creative-writer-stories-bob_smith_example"
        );
    }

    #[test]
    fn test_store_name_never_looks_like_an_index() {
        let name = store_name(&User::new("eve-mrview-notes"));
        assert_eq!(name, "creative-writer-stories-eve_mrview_notes");
        assert_eq!(parse_index_db_name(&name), None);

        let name = store_name(&User::new("a-mrview-mrview-b"));
        assert!(!name.contains(INDEX_MARKER));
    }

    #[test]
    fn test_index_name_round_trip() {
        let name = index_db_name("creative-writer-stories-alice", "type");
        assert_eq!(name, "creative-writer-stories-alice-mrview-type");
        assert_eq!(
            parse_index_db_name(&name),
            Some(("creative-writer-stories-alice", "type"))
        );
    }

    #[test]
    fn test_parse_rejects_primary_stores() {
        assert_eq!(parse_index_db_name("creative-writer-stories-alice"), None);
        assert_eq!(parse_index_db_name("-mrview-type"), None);
        assert_eq!(parse_index_db_name("store-mrview-"), None);
    }
}
