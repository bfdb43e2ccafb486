use serde_json::Value as JsonValue;

/// A single decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// From a query string, a form body or a multipart text part.
    Text(String),
    /// A top-level member of a JSON body.
    Json(JsonValue),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Json(JsonValue::String(text)) => Some(text),
            Value::Json(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

/// All values received under one name.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    One(Value),
    /// The name repeated; values are in arrival order.
    Many(Vec<Value>),
}

impl Param {
    /// The first value received under this name.
    pub fn first(&self) -> &Value {
        match self {
            Param::One(value) => value,
            Param::Many(values) => &values[0],
        }
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Param::One(value) => std::slice::from_ref(value),
            Param::Many(values) => values,
        }
    }

    fn push(&mut self, value: Value) {
        match self {
            Param::Many(values) => values.push(value),
            Param::One(_) => {
                let first = std::mem::replace(self, Param::Many(Vec::with_capacity(2)));
                if let (Param::Many(values), Param::One(first)) = (self, first) {
                    values.push(first);
                    values.push(value);
                }
            }
        }
    }
}

/// Request parameters, keyed by name in first-arrival order.
///
/// # Examples
///
/// ```
/// use bodyspool::{Param, Params};
///
/// let mut params = Params::new();
/// params.add("b", "2");
/// params.add("b", "3");
///
/// assert_eq!(params.get("b"), Some(&Param::Many(vec!["2".into(), "3".into()])));
/// assert_eq!(params.text("b"), Some("2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Param)>,
}

impl Params {
    pub fn new() -> Params {
        Params::default()
    }

    /// Adds a value; a repeated name turns into an ordered list.
    pub fn add<N: Into<String>, V: Into<Value>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, param)) => param.push(value),
            None => self.entries.push((name, Param::One(value))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, param)| param)
    }

    /// The first textual value under `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|param| param.first().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(name, param)| (name.as_str(), param))
    }

    /// Appends every value of `other`, in order.
    pub fn extend(&mut self, other: Params) {
        for (name, param) in other.entries {
            match param {
                Param::One(value) => self.add(name, value),
                Param::Many(values) => {
                    for value in values {
                        self.add(name.clone(), value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_names_keep_order() {
        let mut params = Params::new();
        params.add("a", "1");
        params.add("b", "2");
        params.add("b", "3");
        params.add("b", "4");

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some(&Param::One("1".into())));
        assert_eq!(
            params.get("b").unwrap().values(),
            &[Value::from("2"), Value::from("3"), Value::from("4")][..]
        );
        assert_eq!(params.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_extend_merges_lists() {
        let mut query = Params::new();
        query.add("id", "1");

        let mut body = Params::new();
        body.add("id", "2");
        body.add("id", "3");

        query.extend(body);
        assert_eq!(
            query.get("id"),
            Some(&Param::Many(vec!["1".into(), "2".into(), "3".into()]))
        );
    }

    #[test]
    fn test_json_strings_read_as_text() {
        let mut params = Params::new();
        params.add("s", JsonValue::from("x"));
        params.add("n", JsonValue::from(1));
        assert_eq!(params.text("s"), Some("x"));
        assert_eq!(params.text("n"), None);
    }
}
