use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Name of a message channel (a broker topic or queue).
///
/// Each saga step is bound to exactly one channel, which carries both the
/// forward dispatch and the backward compensation envelopes for that step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Creates a channel name from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the channel name, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ChannelName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn channel_name_from_str_and_string_are_equal() {
        assert_eq!(
            ChannelName::from("PaymentService"),
            ChannelName::from("PaymentService".to_string())
        );
    }

    #[test]
    fn channel_name_display_is_raw_name() {
        let name = ChannelName::new("HotelBookingService");
        assert_eq!(name.to_string(), "HotelBookingService");
        assert_eq!(name.as_str(), "HotelBookingService");
    }

    #[test]
    fn channel_name_serializes_transparently() {
        let name = ChannelName::new("FlightBookingService");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"FlightBookingService\"");

        let back: ChannelName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn channel_name_map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ChannelName::new("orders"), 1);
        assert_eq!(map.get("orders"), Some(&1));
    }
}
