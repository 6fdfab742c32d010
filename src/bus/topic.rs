use crate::infrastructure::container::short_type_name;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 主题键：事件类型 + 可选频道名
#[derive(Clone, Debug)]
pub struct TopicKey {
    type_id: TypeId,
    type_name: &'static str,
    channel: Option<String>,
}

impl TopicKey {
    pub fn of<E: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            channel: None,
        }
    }

    pub fn on_channel<E: 'static>(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::of::<E>()
        }
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for TopicKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.channel == other.channel
    }
}

impl Eq for TopicKey {}

impl Hash for TopicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.channel.hash(state);
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_type_name(self.type_name))?;
        if let Some(channel) = &self.channel {
            write!(f, "@{}", channel)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Jumped;

    #[test]
    fn test_channel_distinguishes_topics() {
        assert_eq!(TopicKey::of::<Jumped>(), TopicKey::of::<Jumped>());
        assert_ne!(TopicKey::of::<Jumped>(), TopicKey::on_channel::<Jumped>("p2"));
        assert_eq!(TopicKey::on_channel::<Jumped>("p2").to_string(), "Jumped@p2");
    }
}
