//! Converts posts, tags and their parts into [`Value`]s for the templates.
//! Every projection is explicit: templates see exactly the keys listed here.

use crate::post::{Person, Post, Timestamp};
use crate::tag::TagInfo;
use chrono::{Locale, TimeZone, Utc};
use gtmpl::Value;
use std::collections::HashMap;

impl From<&TagInfo> for Value {
    fn from(info: &TagInfo) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("label".to_owned(), Value::String(info.label.clone()));
        m.insert("href".to_owned(), Value::String(info.href.clone()));
        m.insert("count".to_owned(), Value::from(info.count as i64));
        Value::Object(m)
    }
}

impl From<&Person> for Value {
    fn from(person: &Person) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(person.name.clone()));
        m.insert("uri".to_owned(), optional_string(&person.uri));
        m.insert("email".to_owned(), optional_string(&person.email));
        Value::Object(m)
    }
}

/// Breaks a timestamp into the parts templates commonly want, as written
/// (in the post's own offset). `month_name` is in the given locale.
pub fn timestamp_value(ts: &Timestamp, locale: Locale) -> Value {
    let local = ts.local();
    let mut m: HashMap<String, Value> = HashMap::new();
    let mut put = |key: &str, value: String| {
        m.insert(key.to_owned(), Value::String(value));
    };
    put("year", local.format("%Y").to_string());
    put("month", local.format("%-m").to_string());
    put("month_2digits", local.format("%m").to_string());
    put(
        "month_name",
        Utc.from_utc_datetime(&local)
            .format_localized("%B", locale)
            .to_string(),
    );
    put("day", local.format("%-d").to_string());
    put("day_2digits", local.format("%d").to_string());
    put("iso_date", local.format("%Y-%m-%d").to_string());
    put("iso_datetime", ts.to_string());
    Value::Object(m)
}

/// Converts a list of [`TagInfo`]s into a [`Value::Array`].
pub fn tag_infos(infos: &[TagInfo]) -> Value {
    Value::Array(infos.iter().map(Value::from).collect())
}

/// Converts free-form YAML metadata into a template value. Mapping keys that
/// aren't strings are dropped.
pub fn yaml_value(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::from(i),
            (None, Some(f)) => Value::from(f),
            (None, None) => Value::Nil,
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(yaml_value).collect()),
        Yaml::Mapping(mapping) => Value::Object(object(mapping)),
    }
}

fn object(mapping: &serde_yaml::Mapping) -> HashMap<String, Value> {
    mapping
        .iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), yaml_value(v))))
        .collect()
}

/// Converts a [`Post`] into a [`Value::Object`] for the templates. `tags`
/// carries the post's own tag infos (see
/// [`crate::tag::TagIndex::post_tags`]). The object has the post's extra
/// metadata plus `title`, `name`, `href`, `dotdotslash`, `body` (HTML),
/// `tags`, `is_draft`, `id`, `author`, `published` and `updated`; keys with
/// no value are [`Value::Nil`].
pub fn post_value(post: &Post, tags: Option<&[TagInfo]>, locale: Locale) -> Value {
    let mut m: HashMap<String, Value> = object(&post.meta.extra);

    m.insert("title".to_owned(), Value::String(post.meta.title.clone()));
    m.insert("name".to_owned(), Value::String(post.name.clone()));
    m.insert("href".to_owned(), Value::String(post.href()));
    m.insert("dotdotslash".to_owned(), Value::String(post.dotdotslash()));
    m.insert("body".to_owned(), Value::String(post.body_html()));
    m.insert(
        "tags".to_owned(),
        match tags {
            Some(tags) => tag_infos(tags),
            None => Value::Nil,
        },
    );
    m.insert("is_draft".to_owned(), Value::Bool(post.meta.draft));
    m.insert("id".to_owned(), optional_string(&post.meta.id));
    m.insert(
        "author".to_owned(),
        post.meta.author.as_ref().map_or(Value::Nil, Value::from),
    );
    m.insert(
        "published".to_owned(),
        post.meta
            .published
            .as_ref()
            .map_or(Value::Nil, |ts| timestamp_value(ts, locale)),
    );
    m.insert(
        "updated".to_owned(),
        post.meta
            .updated
            .as_ref()
            .map_or(Value::Nil, |ts| timestamp_value(ts, locale)),
    );
    Value::Object(m)
}

fn optional_string(s: &Option<String>) -> Value {
    match s {
        Some(s) => Value::String(s.clone()),
        None => Value::Nil,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::post::Meta;

    fn field<'v>(value: &'v Value, key: &str) -> &'v Value {
        match value {
            Value::Object(m) => m.get(key).unwrap_or_else(|| panic!("no field {}", key)),
            _ => panic!("not an object"),
        }
    }

    fn string(value: &Value) -> &str {
        match value {
            Value::String(s) => s,
            _ => panic!("not a string"),
        }
    }

    #[test]
    fn test_expands_dates() {
        let ts: Timestamp = "2024-05-09 13:45:00+10:00".parse().unwrap();
        let value = timestamp_value(&ts, Locale::POSIX);
        for (key, wanted) in &[
            ("year", "2024"),
            ("month", "5"),
            ("month_2digits", "05"),
            ("month_name", "May"),
            ("day", "9"),
            ("day_2digits", "09"),
            ("iso_date", "2024-05-09"),
            ("iso_datetime", "2024-05-09T13:45:00+10:00"),
        ] {
            assert_eq!(string(field(&value, key)), *wanted, "{}", key);
        }
    }

    #[test]
    fn test_month_name_follows_locale() {
        let ts: Timestamp = "2024-08-09 23:30:00-05:00".parse().unwrap();
        let month = |locale: Locale| {
            string(field(&timestamp_value(&ts, locale), "month_name")).to_owned()
        };
        assert_eq!(month(Locale::POSIX), "August");
        assert_eq!(month(Locale::fr_FR), "août");
        assert_eq!(month(Locale::de_DE), "August");
        assert_eq!(month(Locale::nl_NL), "augustus");
    }

    #[test]
    fn test_post_value() -> Result<(), serde_yaml::Error> {
        let meta: Meta = serde_yaml::from_str(
            "title: Hello\n\
             author: Alice de Winter\n\
             mood: cheerful\n\
             tags: [greet]\n",
        )?;
        let post = Post::new("2024/hello", meta, "Hello, *world*!");
        let tags = vec![TagInfo {
            label: "greet".to_owned(),
            href: "tagged/greet.html".to_owned(),
            count: 1,
        }];
        let value = post_value(&post, Some(tags.as_slice()), Locale::POSIX);

        assert_eq!(string(field(&value, "title")), "Hello");
        assert_eq!(string(field(&value, "mood")), "cheerful");
        assert_eq!(string(field(&value, "href")), "2024/hello.html");
        assert_eq!(string(field(&value, "dotdotslash")), "../");
        assert_eq!(string(field(&value, "body")), "<p>Hello, <em>world</em>!</p>\n");
        assert_eq!(
            string(field(field(&value, "author"), "name")),
            "Alice de Winter"
        );
        assert!(matches!(field(&value, "is_draft"), Value::Bool(false)));
        assert!(matches!(field(&value, "published"), Value::Nil));
        match field(&value, "tags") {
            Value::Array(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(string(field(&items[0], "href")), "tagged/greet.html");
            }
            _ => panic!("tags should be an array"),
        }
        Ok(())
    }

    #[test]
    fn test_yaml_value() -> Result<(), serde_yaml::Error> {
        let yaml: serde_yaml::Value = serde_yaml::from_str("a: [x, true]\nb: ~\n")?;
        let value = yaml_value(&yaml);
        match field(&value, "a") {
            Value::Array(items) => {
                assert_eq!(string(&items[0]), "x");
                assert!(matches!(items[1], Value::Bool(true)));
            }
            _ => panic!("a should be an array"),
        }
        assert!(matches!(field(&value, "b"), Value::Nil));
        Ok(())
    }
}
