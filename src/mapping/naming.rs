use super::profile::{Role, TargetProfile};
use heck::ToSnakeCase;

/// Map an identifier for one role. Entity and file names are singularized
/// first; roles the profile marks as plural are pluralized.
pub fn map_name(identifier: &str, profile: &TargetProfile, role: Role) -> String {
    let mut word = identifier.to_snake_case();
    if matches!(role, Role::Entity | Role::File) {
        word = on_last_word(&word, singularize);
    }
    if profile.plural.contains(&role) {
        word = on_last_word(&on_last_word(&word, singularize), pluralize);
    }
    profile.casing(role).apply(&word)
}

/// Apply `f` to the last word of a snake_case name. A trailing number is
/// not a word: `user_2` inflects `user`.
pub(crate) fn on_last_word(snake: &str, f: fn(&str) -> String) -> String {
    if let Some((head, n)) = snake.rsplit_once('_') {
        if !head.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{}_{}", on_last_word(head, f), n);
        }
    }
    match snake.rsplit_once('_') {
        Some((head, last)) if !last.is_empty() => format!("{}_{}", head, f(last)),
        _ => f(snake),
    }
}

/// Words whose plural and singular are spelled the same.
const UNCOUNTABLE: &[&str] = &[
    "data", "metadata", "information", "equipment", "news", "series", "species", "status",
    "feedback", "media", "settings",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("foot", "feet"),
    ("tooth", "teeth"),
];

pub fn pluralize(s: &str) -> String {
    if s.is_empty() || UNCOUNTABLE.contains(&s) {
        return s.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == s) {
        return plural.to_string();
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == s) {
        return s.to_string();
    }

    if s.ends_with('y') {
        // policy -> policies, but key -> keys
        let before_y = s[..s.len() - 1].chars().last();
        if before_y.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", &s[..s.len() - 1]);
        }
        format!("{}s", s)
    } else if s.ends_with("ss")
        || s.ends_with('x')
        || s.ends_with('z')
        || s.ends_with("sh")
        || s.ends_with("ch")
    {
        format!("{}es", s)
    } else if s.ends_with('s') {
        // Already plural
        s.to_string()
    } else {
        format!("{}s", s)
    }
}

pub fn singularize(s: &str) -> String {
    if s.is_empty() || UNCOUNTABLE.contains(&s) {
        return s.to_string();
    }
    if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == s) {
        return single.to_string();
    }

    if let Some(stem) = s.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "xes", "zes", "shes", "ches"] {
        if s.ends_with(suffix) {
            return s[..s.len() - 2].to_string();
        }
    }
    if s.ends_with("ss") || s.ends_with("us") || s.ends_with("is") {
        return s.to_string();
    }
    match s.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::mapping::TargetKey;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("key"), "keys");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("branch"), "branches");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("users"), "users");
        assert_eq!(pluralize("status"), "status");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("products"), "product");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("keys"), "key");
    }

    #[test]
    fn test_map_name_roles() {
        let profiles = ProfileSet::builtin().unwrap();
        let rust = profiles.get(&TargetKey::new("rust", "axum")).unwrap();

        assert_eq!(map_name("order_items", rust, Role::Entity), "OrderItem");
        assert_eq!(map_name("order_items", rust, Role::Route), "order-items");
        assert_eq!(map_name("order_items", rust, Role::File), "order_item");
        assert_eq!(map_name("CreatedAt", rust, Role::Field), "created_at");

        let ts = profiles.get(&TargetKey::new("typescript", "express")).unwrap();
        assert_eq!(map_name("category", ts, Role::Route), "categories");
        assert_eq!(map_name("created_at", ts, Role::Field), "createdAt");
    }

    #[test]
    fn test_trailing_number_is_not_inflected() {
        let profiles = ProfileSet::builtin().unwrap();
        let rust = profiles.get(&TargetKey::new("rust", "axum")).unwrap();

        assert_eq!(map_name("users_2", rust, Role::Entity), "User2");
        assert_eq!(map_name("users_2", rust, Role::File), "user_2");
        assert_eq!(map_name("users_2", rust, Role::Route), "users-2");
    }

    #[test]
    fn test_map_name_is_pure() {
        let profiles = ProfileSet::builtin().unwrap();
        for profile in profiles.iter() {
            for role in Role::ALL {
                assert_eq!(
                    map_name("product_tags", profile, role),
                    map_name("product_tags", profile, role)
                );
            }
        }
    }
}
