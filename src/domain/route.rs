//! # Route Descriptors
//!
//! A `RouteDescriptor` names a dispatch target: which section, which method, which kind of
//! trigger produced it, and the callback parameters that travelled with it.
//!
//! Callback payloads use the `section.method[k=v&k2=v2]` encoding. The bracketed part is a
//! form-urlencoded query string and is optional.

use std::fmt;

use url::form_urlencoded;

use crate::domain::errors::RouteError;

/// Reserved callback parameter that cancels a pending input request.
pub const CANCEL_WAIT_PARAM: &str = "cancel_wait";

/// What kind of platform trigger produced a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerKind {
    #[default]
    Command,
    Callback,
    Hears,
    Message,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerKind::Command => "command",
            TriggerKind::Callback => "callback",
            TriggerKind::Hears => "hears",
            TriggerKind::Message => "message",
        };
        f.write_str(name)
    }
}

/// Ordered key/value parameters carried by a callback payload.
///
/// Keeps insertion order and allows repeated keys, like a browser `URLSearchParams`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallbackParams {
    pairs: Vec<(String, String)>,
}

impl CallbackParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a form-urlencoded query (`k=v&k2=v2`).
    pub fn parse(query: &str) -> Self {
        let pairs = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Replaces every value under `key` with a single one, keeping the first position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| *k == key) {
            Some(idx) => {
                self.pairs[idx].1 = value;
                let mut seen = false;
                self.pairs.retain(|(k, _)| {
                    if *k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.pairs.push((key, value)),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes back to a form-urlencoded query string.
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

/// Splits a callback payload into its action path and parameters.
///
/// `shop.item[id=5&page=2]` becomes (`shop.item`, `id=5&page=2`). A payload whose brackets
/// enclose nothing is returned untouched with empty params.
pub fn split_callback_payload(payload: &str) -> (String, CallbackParams) {
    if let (Some(open), Some(close)) = (payload.find('['), payload.rfind(']'))
        && close > open + 1
    {
        let params = CallbackParams::parse(&payload[open + 1..close]);
        return (payload[..open].to_string(), params);
    }
    (payload.to_string(), CallbackParams::new())
}

/// Produces a callback payload from an action path and parameters.
pub fn encode_callback_payload(action_path: &str, params: &CallbackParams) -> String {
    if params.is_empty() {
        action_path.to_string()
    } else {
        format!("{}[{}]", action_path, params.to_query())
    }
}

/// Describes where a dispatch should go.
///
/// Built with the chained methods below; clone it before handing the same route to a
/// second dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteDescriptor {
    handler_id: Option<String>,
    method: Option<String>,
    trigger: TriggerKind,
    params: CallbackParams,
    callback_style: bool,
    action_path: Option<String>,
    hears_key: Option<String>,
}

impl RouteDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `RouteDescriptor::new().section(id).method(method)`.
    pub fn to(handler_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new().section(handler_id).method(method)
    }

    /// Parses a `section.method[params]` payload into a callback-style route.
    pub fn from_callback_payload(payload: &str) -> Result<Self, RouteError> {
        let (action_path, params) = split_callback_payload(payload);
        let mut segments = action_path.split('.');
        let (Some(section), Some(method)) = (segments.next(), segments.next()) else {
            return Err(RouteError::MalformedAction(payload.to_string()));
        };
        if section.is_empty() || method.is_empty() {
            return Err(RouteError::MalformedAction(payload.to_string()));
        }
        Ok(Self::to(section, method)
            .trigger(TriggerKind::Callback)
            .callback_params(action_path, params))
    }

    pub fn section(mut self, handler_id: impl Into<String>) -> Self {
        self.handler_id = Some(handler_id.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.method = Some(name.into());
        self
    }

    pub fn trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn params(mut self, params: CallbackParams) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.set(key, value);
        self
    }

    /// Sets params and action path together; marks the route callback-style.
    pub fn callback_params(mut self, action_path: impl Into<String>, params: CallbackParams) -> Self {
        self.params = params;
        self.action_path(action_path)
    }

    pub fn action_path(mut self, path: impl Into<String>) -> Self {
        self.action_path = Some(path.into());
        self.callback_style = true;
        self
    }

    pub fn hears_key(mut self, key: impl Into<String>) -> Self {
        self.hears_key = Some(key.into());
        self
    }

    pub fn as_callback(mut self, flag: bool) -> Self {
        self.callback_style = flag;
        self
    }

    pub fn as_command(mut self) -> Self {
        self.callback_style = false;
        self
    }

    pub fn handler_id(&self) -> Option<&str> {
        self.handler_id.as_deref()
    }

    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger
    }

    pub fn callback_params_ref(&self) -> &CallbackParams {
        &self.params
    }

    pub fn action_path_ref(&self) -> Option<&str> {
        self.action_path.as_deref()
    }

    pub fn hears_key_ref(&self) -> Option<&str> {
        self.hears_key.as_deref()
    }

    pub fn is_callback_style(&self) -> bool {
        self.callback_style
    }

    /// True when the route carries the reserved cancel marker.
    pub fn is_cancel_request(&self) -> bool {
        self.params.has(CANCEL_WAIT_PARAM)
    }

    /// Payload that routes back to this descriptor when used as button data.
    pub fn to_callback_payload(&self) -> String {
        let path = match (&self.action_path, &self.handler_id, &self.method) {
            (Some(path), _, _) => path.clone(),
            (None, Some(section), Some(method)) => format!("{section}.{method}"),
            (None, Some(section), None) => format!("{section}.index"),
            _ => String::new(),
        };
        encode_callback_payload(&path, &self.params)
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} ({})",
            self.handler_id.as_deref().unwrap_or("?"),
            self.method.as_deref().unwrap_or("?"),
            self.trigger
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_payload_with_params() {
        let (path, params) = split_callback_payload("shop.item[id=5&page=2]");
        assert_eq!(path, "shop.item");
        assert_eq!(params.get("id"), Some("5"));
        assert_eq!(params.get("page"), Some("2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_split_payload_without_params() {
        let (path, params) = split_callback_payload("home.index");
        assert_eq!(path, "home.index");
        assert!(params.is_empty());

        // Empty brackets are not a parameter block
        let (path, params) = split_callback_payload("home.index[]");
        assert_eq!(path, "home.index[]");
        assert!(params.is_empty());
    }

    #[test]
    fn test_encoding_is_exact() {
        let params = CallbackParams::from_pairs([("k", "v"), ("k2", "v2")]);
        assert_eq!(encode_callback_payload("a.b", &params), "a.b[k=v&k2=v2]");
        assert_eq!(encode_callback_payload("a.b", &CallbackParams::new()), "a.b");

        let spaced = CallbackParams::from_pairs([("q", "two words")]);
        assert_eq!(encode_callback_payload("s.find", &spaced), "s.find[q=two+words]");
        let (_, back) = split_callback_payload("s.find[q=two+words]");
        assert_eq!(back.get("q"), Some("two words"));
    }

    #[test]
    fn test_route_from_payload() {
        let route = RouteDescriptor::from_callback_payload("home.index[cancel_wait=1]").unwrap();
        assert_eq!(route.handler_id(), Some("home"));
        assert_eq!(route.method_name(), Some("index"));
        assert_eq!(route.trigger_kind(), TriggerKind::Callback);
        assert_eq!(route.action_path_ref(), Some("home.index"));
        assert!(route.is_callback_style());
        assert!(route.is_cancel_request());
        assert_eq!(route.to_callback_payload(), "home.index[cancel_wait=1]");
    }

    #[test]
    fn test_malformed_payload() {
        assert!(RouteDescriptor::from_callback_payload("justone").is_err());
        assert!(RouteDescriptor::from_callback_payload(".index").is_err());
    }

    #[test]
    fn test_set_replaces_repeated_keys() {
        let mut params = CallbackParams::parse("page=1&a=x&page=3");
        params.set("page", "7");
        assert_eq!(params.to_query(), "page=7&a=x");
    }

    #[test]
    fn test_builder_flags() {
        let route = RouteDescriptor::to("shop", "list").action_path("shop.list");
        assert!(route.is_callback_style());
        let route = route.as_command();
        assert!(!route.is_callback_style());
        assert_eq!(route.to_callback_payload(), "shop.list");
    }
}
