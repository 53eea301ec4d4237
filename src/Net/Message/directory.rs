use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::NetError;
use crate::Net::collaborators::MessageDirectory;
use crate::Net::Message::{KeepAlive, Message};
use crate::Net::Structs::{DEFAULT_MESSAGES_TYPE, SUBTYPE_KEEP_ALIVE};

type Factory = Box<dyn Fn() -> Box<dyn Message> + Send + Sync>;

/// In-process [`MessageDirectory`] mapping (type, subtype) to a factory.
///
/// The keep-alive message is registered on construction.
pub struct TypeDirectory {
    factories: RwLock<HashMap<(u8, u8), Factory>>,
}

impl Default for TypeDirectory {
    fn default() -> Self {
        let directory = Self {
            factories: RwLock::new(HashMap::new()),
        };
        directory
            .factories
            .write()
            .insert((DEFAULT_MESSAGES_TYPE, SUBTYPE_KEEP_ALIVE), Box::new(|| Box::new(KeepAlive)));
        directory
    }
}

impl TypeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its own (type, subtype), built with `Default`.
    pub fn register<T: Message + Default>(&self) -> Result<(), NetError> {
        let sample = T::default();
        self.register_with(sample.message_type(), sample.subtype(), || Box::new(T::default()))
    }

    pub fn register_with<F>(
        &self,
        message_type: u8,
        subtype: u8,
        factory: F,
    ) -> Result<(), NetError>
    where
        F: Fn() -> Box<dyn Message> + Send + Sync + 'static,
    {
        if message_type == DEFAULT_MESSAGES_TYPE {
            return Err(NetError::config(format!(
                "message type {DEFAULT_MESSAGES_TYPE} is reserved for transport messages"
            )));
        }
        let mut factories = self.factories.write();
        if factories.contains_key(&(message_type, subtype)) {
            return Err(NetError::config(format!(
                "message type {message_type}, subtype {subtype} is already registered"
            )));
        }
        factories.insert((message_type, subtype), Box::new(factory));
        debug!(message_type, subtype, "registered message type");
        Ok(())
    }
}

impl MessageDirectory for TypeDirectory {
    fn contains(&self, message_type: u8, subtype: u8) -> bool {
        self.factories.read().contains_key(&(message_type, subtype))
    }

    fn instantiate(&self, message_type: u8, subtype: u8) -> Option<Box<dyn Message>> {
        self.factories
            .read()
            .get(&(message_type, subtype))
            .map(|factory| factory())
    }
}
