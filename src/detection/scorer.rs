//! Base anomaly scoring.
//!
//! The fusion engine treats the base model as a black box returning a
//! probability in [0, 1]. `HeuristicScorer` is the built-in baseline over
//! the same features the trained model consumes (account age, order history,
//! amount, payment method); swap in a real model behind the same trait.

use crate::types::transaction::{PaymentMethod, Transaction};

/// Black-box base scorer. Must be total: any valid transaction gets a score.
pub trait RiskScorer: Send + Sync {
    /// Anomaly probability in [0, 1].
    fn score(&self, tx: &Transaction) -> f64;
}

/// Deterministic baseline scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    fn payment_method_risk(method: PaymentMethod) -> f64 {
        match method {
            PaymentMethod::CreditCard | PaymentMethod::DebitCard => 0.05,
            PaymentMethod::BankTransfer => 0.08,
            PaymentMethod::Paypal => 0.10,
            PaymentMethod::Crypto => 0.25,
        }
    }
}

impl RiskScorer for HeuristicScorer {
    fn score(&self, tx: &Transaction) -> f64 {
        let mut score = Self::payment_method_risk(tx.payment_method);

        // Fresh accounts with little history are the dominant anomaly signal.
        if tx.account_age_days < 7 {
            score += 0.30;
        } else if tx.account_age_days < 30 {
            score += 0.15;
        }

        if tx.total_orders == 0 {
            score += 0.10;
        }

        // Amount far above the user's usual spend.
        if tx.avg_order_value > 0.0 {
            let ratio = tx.amount / tx.avg_order_value;
            if ratio >= 10.0 {
                score += 0.30;
            } else if ratio >= 3.0 {
                score += 0.15;
            }
        } else if tx.amount >= 500.0 {
            score += 0.20;
        }

        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_established_account_scores_low() {
        let scorer = HeuristicScorer::new();
        let tx = Transaction::new("ord_1", "u1", 50.0, PaymentMethod::CreditCard);
        assert!(scorer.score(&tx) < 0.40);
    }

    #[test]
    fn test_new_account_large_crypto_order_scores_high() {
        let scorer = HeuristicScorer::new();
        let mut tx = Transaction::new("ord_1", "u1", 900.0, PaymentMethod::Crypto);
        tx.account_age_days = 2;
        tx.total_orders = 0;
        tx.avg_order_value = 30.0;

        let score = scorer.score(&tx);
        assert!(score >= 0.70, "expected high score, got {}", score);
    }

    #[test]
    fn test_score_stays_in_unit_range() {
        let scorer = HeuristicScorer::new();
        let mut tx = Transaction::new("ord_1", "u1", 999_999.0, PaymentMethod::Crypto);
        tx.account_age_days = 0;
        tx.total_orders = 0;
        tx.avg_order_value = 0.01;

        let score = scorer.score(&tx);
        assert!((0.0..=1.0).contains(&score));
    }
}
