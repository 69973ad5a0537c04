use serde::{Deserialize, Serialize};
use serde_json::Number;
use utoipa::ToSchema;

/// Sender recorded on the reward transaction a node credits itself when mining
pub const REWARD_SENDER: &str = "0";

/// Amount credited to the mining node for every block
pub const MINING_REWARD: u64 = 1;

/// Represents a transfer recorded on the ledger
///
/// The amount keeps the exact JSON number it was submitted with, so an
/// integer amount stays an integer when the containing block is hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    pub sender: String,

    /// Recipient's address
    pub recipient: String,

    /// Amount being transferred
    #[schema(value_type = f64)]
    pub amount: Number,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - The address of the sender
    /// * `recipient` - The address of the recipient
    /// * `amount` - The amount to transfer
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    /// Creates the reward transaction credited to a mining node
    pub fn reward(node_id: &str) -> Self {
        Transaction::new(REWARD_SENDER, node_id, MINING_REWARD)
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new("alice", "bob", 5u64);

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
        assert_eq!(transaction.amount, Number::from(5u64));
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::reward("node-1");

        assert_eq!(transaction.sender, REWARD_SENDER);
        assert_eq!(transaction.recipient, "node-1");
        assert_eq!(transaction.amount, Number::from(MINING_REWARD));
        assert!(transaction.is_reward());
    }

    #[test]
    fn test_amount_keeps_number_form() {
        let integer: Transaction =
            serde_json::from_str(r#"{"sender":"a","recipient":"b","amount":5}"#).unwrap();
        let float: Transaction =
            serde_json::from_str(r#"{"sender":"a","recipient":"b","amount":2.5}"#).unwrap();

        assert_eq!(serde_json::to_value(&integer).unwrap()["amount"].to_string(), "5");
        assert_eq!(serde_json::to_value(&float).unwrap()["amount"].to_string(), "2.5");
    }
}
