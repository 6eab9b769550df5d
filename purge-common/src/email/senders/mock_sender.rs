use async_trait::async_trait;
use std::sync::Mutex;

use crate::email::{EmailError, EmailMessage, SendEmail};

/// Logs messages instead of sending them and keeps the destinations and bodies for inspection.
#[derive(Default)]
pub struct MockSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SendEmail for MockSender {
    async fn send<'a>(&self, message: EmailMessage<'a>) -> Result<(), EmailError> {
        log::debug!("Mock email to {}: {}", message.destination, message.subject);

        let entry = (String::from(message.destination), message.body);
        match self.sent.lock() {
            Ok(mut sent) => sent.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }

        Ok(())
    }
}
