use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// A header map that preserves insertion order and holds one value per name.
///
/// Names compare case-insensitively. Setting an existing name replaces its
/// value in place, which is what makes [`merge`](Self::merge) key-by-key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaderMap {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
        let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
        self.set(name, value);
        Ok(())
    }

    /// Insert an already-validated header, replacing any value under the same name.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        if let Some((_, v)) = self.headers.iter_mut().find(|(n, _)| *n == name) {
            *v = value;
        } else {
            self.headers.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.headers.retain(|(n, _)| *n != target);
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from_str(name).ok()?;
        self.headers
            .iter()
            .find(|(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overlay `other` onto `self`: names in `other` win, all others survive.
    pub fn merge(&mut self, other: &OrderedHeaderMap) {
        for (name, value) in &other.headers {
            self.set(name.clone(), value.clone());
        }
    }

    /// Non-mutating form of [`merge`](Self::merge).
    pub fn merged(&self, other: &OrderedHeaderMap) -> OrderedHeaderMap {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Consumes the map and returns a standard http::HeaderMap.
    pub fn to_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            map.append(name, value);
        }
        map
    }
}

impl<'a> TryFrom<&[(&'a str, &'a str)]> for OrderedHeaderMap {
    type Error = NetError;

    fn try_from(pairs: &[(&'a str, &'a str)]) -> Result<Self, Self::Error> {
        let mut map = OrderedHeaderMap::new();
        for (name, value) in pairs {
            map.insert(name, value)?;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Content-Type", "application/json").unwrap();
        assert_eq!(
            headers.get("Content-Type").unwrap().to_str().unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_case_insensitive_get() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("ACCEPT", "text/html").unwrap();
        assert!(headers.contains("accept"));
        assert!(headers.contains("Accept"));
    }

    #[test]
    fn test_update_existing_header() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Host", "example.com").unwrap();
        headers.insert("host", "updated.com").unwrap();
        assert_eq!(headers.get("Host").unwrap(), "updated.com");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_merge_override_wins_and_base_survives() {
        let base = OrderedHeaderMap::try_from(
            &[("x-api-key", "base"), ("accept", "text/plain")][..],
        )
        .unwrap();
        let call =
            OrderedHeaderMap::try_from(&[("X-Api-Key", "call"), ("x-trace", "1")][..]).unwrap();

        let merged = base.merged(&call);
        assert_eq!(merged.get("x-api-key").unwrap(), "call");
        assert_eq!(merged.get("accept").unwrap(), "text/plain");
        assert_eq!(merged.get("x-trace").unwrap(), "1");
        assert_eq!(merged.len(), 3);

        // The base map is untouched.
        assert_eq!(base.get("x-api-key").unwrap(), "base");
    }

    #[test]
    fn test_merge_keeps_base_position() {
        let mut headers = OrderedHeaderMap::try_from(&[("a", "1"), ("b", "2")][..]).unwrap();
        headers.merge(&OrderedHeaderMap::try_from(&[("c", "3"), ("a", "9")][..]).unwrap());

        let names: Vec<_> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_header() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("X-Custom", "value").unwrap();
        headers.remove("x-custom");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_invalid_header_name() {
        let mut headers = OrderedHeaderMap::new();
        assert_eq!(
            headers.insert("Invalid Header", "value"),
            Err(NetError::InvalidHeader)
        );
    }

    #[test]
    fn test_invalid_header_value() {
        let mut headers = OrderedHeaderMap::new();
        assert!(headers.insert("Valid", "invalid\nvalue").is_err());
    }
}
