use {
    once_cell::sync::Lazy,
    serde_json::value::RawValue,
};

static NULL_FRAGMENT: Lazy<Box<RawValue>> =
    Lazy::new(|| RawValue::from_string("null".to_owned()).expect("literal null is valid JSON"));

/// Returns the raw JSON fragment `null`, used both for responses addressed
/// to requests without a usable ID and for handlers that produce no result.
pub fn null_raw_value() -> Box<RawValue> {
    NULL_FRAGMENT.clone()
}

pub mod raw_fragment {
    use {
        serde::{Deserialize, Deserializer},
        serde_json::value::RawValue,
    };

    /// Deserializes an optional raw JSON fragment, keeping a present-but-null
    /// field distinguishable from an absent one.
    ///
    /// Serde maps an explicit JSON `null` onto `Option::None`, which erases
    /// the distinction the JSON-RPC envelope relies on (`"id": null` is a
    /// call, a missing `id` is a notification). Routing the field through
    /// [`RawValue`] preserves the `null` literal as `Some`. Combine with
    /// `#[serde(default)]` so an absent field still becomes `None`.
    pub fn optional<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Box::<RawValue>::deserialize(deserializer).map(Some)
    }
}

/// Compares two optional raw fragments by JSON value equivalence.
///
/// Fragments that fail to parse fall back to byte comparison so that
/// equality never errors.
pub fn raw_json_eq(a: Option<&RawValue>, b: Option<&RawValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            match (
                serde_json::from_str::<serde_json::Value>(a.get()),
                serde_json::from_str::<serde_json::Value>(b.get()),
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => a.get() == b.get(),
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use {
        super::raw_fragment,
        serde::Deserialize,
        serde_json::value::RawValue,
    };

    #[test]
    fn optional_preserves_explicit_null() {
        #[derive(Deserialize)]
        struct Data {
            #[serde(default, deserialize_with = "raw_fragment::optional")]
            id: Option<Box<RawValue>>,
        }

        let present: Data = serde_json::from_str(r#"{"id":null}"#).unwrap();
        assert_eq!(present.id.as_deref().map(RawValue::get), Some("null"));

        let absent: Data = serde_json::from_str(r#"{}"#).unwrap();
        assert!(absent.id.is_none());
    }

    #[test]
    fn raw_json_eq_ignores_formatting() {
        let a = RawValue::from_string(r#"{"a": 1, "b": [1, 2]}"#.to_owned()).unwrap();
        let b = RawValue::from_string(r#"{"b":[1,2],"a":1}"#.to_owned()).unwrap();

        assert!(super::raw_json_eq(Some(&a), Some(&b)));
        assert!(!super::raw_json_eq(Some(&a), None));
        assert!(super::raw_json_eq(None, None));
    }
}
