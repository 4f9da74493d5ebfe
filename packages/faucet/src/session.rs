//! Operator session
//!
//! The one operator key of the process, both of its address projections, and
//! one submission lane per environment. Transfer paths only execute with a
//! lane guard in hand, so at most one transaction per environment is
//! outstanding and nonces/sequences are never raced.
//!
//! A lane also remembers a transaction that outlived its submission deadline.
//! The next submission in that lane first waits for it to be included or
//! dropped.

use alloy::primitives::Address;
use dualchain_rs::{Environment, OperatorKey};
use eyre::Result;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

/// A broadcast transaction whose fate was not observed before its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingTx {
    pub tx_reference: String,
    pub since: Instant,
}

/// Exclusive right to submit in one environment
#[derive(Debug)]
pub struct LaneGuard<'a> {
    environment: Environment,
    outstanding: MutexGuard<'a, Option<OutstandingTx>>,
}

impl LaneGuard<'_> {
    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn outstanding(&self) -> Option<&OutstandingTx> {
        self.outstanding.as_ref()
    }

    pub fn record_outstanding(&mut self, tx_reference: String) {
        *self.outstanding = Some(OutstandingTx {
            tx_reference,
            since: Instant::now(),
        });
    }

    pub fn clear_outstanding(&mut self) -> Option<OutstandingTx> {
        self.outstanding.take()
    }
}

#[derive(Debug)]
pub struct OperatorSession {
    key: OperatorKey,
    ledger_a_address: String,
    ledger_a_lane: Mutex<Option<OutstandingTx>>,
    ledger_b_lane: Mutex<Option<OutstandingTx>>,
}

impl OperatorSession {
    pub fn new(key: OperatorKey, prefix: &str) -> Result<Self> {
        let ledger_a_address = key.ledger_a_address(prefix)?;
        Ok(Self {
            key,
            ledger_a_address,
            ledger_a_lane: Mutex::new(None),
            ledger_b_lane: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &OperatorKey {
        &self.key
    }

    /// Operator address on Ledger-A (bech32)
    pub fn ledger_a_address(&self) -> &str {
        &self.ledger_a_address
    }

    /// Operator address on Ledger-B
    pub fn ledger_b_address(&self) -> Address {
        self.key.address()
    }

    /// Operator address rendered for `environment`
    pub fn address_in(&self, environment: Environment) -> String {
        match environment {
            Environment::LedgerA => self.ledger_a_address.clone(),
            Environment::LedgerB => self.ledger_b_address().to_checksum(None),
        }
    }

    /// Wait for the submission lane of `environment`
    pub async fn lane(&self, environment: Environment) -> LaneGuard<'_> {
        let outstanding = match environment {
            Environment::LedgerA => self.ledger_a_lane.lock().await,
            Environment::LedgerB => self.ledger_b_lane.lock().await,
        };
        LaneGuard {
            environment,
            outstanding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualchain_rs::AddressTranslator;
    use std::time::Duration;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn session() -> OperatorSession {
        OperatorSession::new(OperatorKey::from_private_key(ANVIL_KEY).unwrap(), "evmos").unwrap()
    }

    #[test]
    fn test_projections_share_account() {
        let session = session();
        assert_eq!(
            session.ledger_a_address(),
            "evmos17w0adeg64ky0daxwd2ugyuneellmjgnxpu2u3g"
        );
        assert_eq!(
            session.address_in(Environment::LedgerB),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );

        let translator = AddressTranslator::new("evmos");
        let as_b = translator
            .normalize("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")
            .unwrap();
        let as_a = translator.normalize(session.ledger_a_address()).unwrap();
        assert_eq!(as_a.account_key(), as_b.account_key());
        assert_eq!(as_a.ledger_b(), session.ledger_b_address());
    }

    #[tokio::test]
    async fn test_lanes_are_independent_and_exclusive() {
        let session = session();
        let _b = session.lane(Environment::LedgerB).await;

        // The other environment's lane is free
        let a = tokio::time::timeout(Duration::from_millis(50), session.lane(Environment::LedgerA)).await;
        assert!(a.is_ok());

        // The same lane is held
        let b_again =
            tokio::time::timeout(Duration::from_millis(50), session.lane(Environment::LedgerB)).await;
        assert!(b_again.is_err());
    }

    #[tokio::test]
    async fn test_outstanding_tx_survives_the_guard() {
        let session = session();
        {
            let mut lane = session.lane(Environment::LedgerB).await;
            assert_eq!(lane.environment(), Environment::LedgerB);
            assert!(lane.outstanding().is_none());
            lane.record_outstanding("0xabc".to_string());
        }

        let mut lane = session.lane(Environment::LedgerB).await;
        assert_eq!(
            lane.outstanding().map(|o| o.tx_reference.as_str()),
            Some("0xabc")
        );
        assert!(session.lane(Environment::LedgerA).await.outstanding().is_none());

        assert!(lane.clear_outstanding().is_some());
        assert!(lane.outstanding().is_none());
    }
}
