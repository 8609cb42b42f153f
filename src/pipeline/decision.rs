use serde::{Deserialize, Serialize};

use super::{Recommendation, Volatility};

/// Projected 90-day change (percent) at or below which waiting pays off.
pub const WAIT_CHANGE_PCT: f64 = -3.0;
/// Projected 90-day change (percent) at or above which a stable rise is a buy.
pub const RISING_CHANGE_PCT: f64 = 2.0;
/// Discount versus the market median (percent) that counts as a strong deal.
pub const STRONG_DEAL_PCT: f64 = -10.0;
/// Confidence needed by the falling-price and strong-deal rules.
pub const DECISIVE_CONFIDENCE: u8 = 75;

/// Which rule of the decision table fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    FallingPrices,
    StableRise,
    StrongDeal,
    NoSignal,
}

/// Signals the decision table reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInputs {
    pub change_pct: f64,
    pub confidence: u8,
    pub volatility: Volatility,
    pub price_vs_median_pct: f64,
}

/// Final recommendation with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub final_recommendation: Recommendation,
    pub rule: DecisionRule,
    pub rationale: String,
}

/// First-match rule table. Rules are evaluated in priority order and the
/// first one whose condition holds decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn decide(&self, inputs: &DecisionInputs) -> Decision {
        let DecisionInputs {
            change_pct,
            confidence,
            volatility,
            price_vs_median_pct,
        } = *inputs;

        let (final_recommendation, rule, rationale) =
            if change_pct <= WAIT_CHANGE_PCT && confidence >= DECISIVE_CONFIDENCE {
                (
                    Recommendation::Wait,
                    DecisionRule::FallingPrices,
                    format!(
                        "Prices projected to fall {:.1}% over 90 days (confidence {}%). \
                         Waiting likely saves money.",
                        change_pct.abs(),
                        confidence
                    ),
                )
            } else if change_pct >= RISING_CHANGE_PCT && volatility == Volatility::Low {
                (
                    Recommendation::BuyNow,
                    DecisionRule::StableRise,
                    format!(
                        "Prices rising {:.1}% with low volatility; a stable upward trend \
                         signals a good time to buy.",
                        change_pct
                    ),
                )
            } else if price_vs_median_pct <= STRONG_DEAL_PCT && confidence >= DECISIVE_CONFIDENCE {
                (
                    Recommendation::BuyNow,
                    DecisionRule::StrongDeal,
                    format!(
                        "Listing is {:.1}% below market median, a compelling value deal \
                         with {}% confidence.",
                        price_vs_median_pct.abs(),
                        confidence
                    ),
                )
            } else {
                (
                    Recommendation::Monitor,
                    DecisionRule::NoSignal,
                    format!(
                        "No strong buy or sell signal: {:+.1}% projected change, {} volatility. \
                         Continue monitoring for a better entry point.",
                        change_pct, volatility
                    ),
                )
            };

        Decision {
            final_recommendation,
            rule,
            rationale,
        }
    }
}
