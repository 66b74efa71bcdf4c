//! Deterministic name-pattern classification.
//!
//! Last step of the lookup protocol. It needs no network access and always
//! produces a record that passes impact validation.

use crate::models::{IngredientRecord, MIN_IMPACT_LEN, RiskLevel, validate_impact};

/// A lexical rule: any of `terms` in the lower-cased name selects the rule.
struct Rule {
    terms: &'static [&'static str],
    risk: RiskLevel,
    template: fn(&str) -> String,
}

const RULES: &[Rule] = &[
    Rule {
        terms: &["acid", "aha", "bha"],
        risk: RiskLevel::Medium,
        template: |name| {
            format!(
                "Chemical exfoliant {name} that helps remove dead skin cells; may cause irritation or sensitivity, especially with sun exposure."
            )
        },
    },
    Rule {
        terms: &["oil", "butter", "wax"],
        risk: RiskLevel::Low,
        template: |name| {
            format!(
                "Natural emollient {name} that provides moisturizing and conditioning properties; generally well-tolerated but may cause comedogenic effects in acne-prone skin."
            )
        },
    },
    Rule {
        terms: &["glycol", "glycerin"],
        risk: RiskLevel::Low,
        template: |name| {
            format!(
                "Humectant {name} that attracts and retains moisture in the skin; typically safe but may cause mild irritation in very sensitive individuals."
            )
        },
    },
    Rule {
        terms: &["silicone", "dimethicone", "cyclo"],
        risk: RiskLevel::Low,
        template: |name| {
            format!(
                "Silicone-based ingredient {name} that provides smooth texture and protective barrier; generally safe but may cause buildup with prolonged use."
            )
        },
    },
    Rule {
        terms: &["paraben", "preservative"],
        risk: RiskLevel::Medium,
        template: |name| {
            format!(
                "Preservative {name} that prevents microbial growth in cosmetics; some concerns about potential endocrine disruption with long-term use."
            )
        },
    },
];

fn generic(name: &str) -> String {
    format!(
        "Cosmetic ingredient {name} used for formulation purposes; specific safety profile requires individual assessment based on concentration and usage."
    )
}

/// Classifies an ingredient from its name alone.
///
/// Rules are checked in order and the first match wins; names matching no
/// rule are Low risk generic formulation ingredients. The impact mentions the
/// ingredient as written, unless that would make the text read as a
/// placeholder (a name containing "unknown", say), in which case it says
/// "this ingredient" instead.
#[must_use]
pub fn heuristic_record(ingredient: &str) -> IngredientRecord {
    let name = ingredient.trim();
    let lower = name.to_lowercase();

    let (risk, template) = RULES
        .iter()
        .find(|rule| rule.terms.iter().any(|term| lower.contains(term)))
        .map_or((RiskLevel::Low, generic as fn(&str) -> String), |rule| {
            (rule.risk, rule.template)
        });

    let impact = template(name);
    let impact = if validate_impact(&impact, MIN_IMPACT_LEN).is_ok() {
        impact
    } else {
        template("this ingredient")
    };

    IngredientRecord::trusted(risk, impact)
}
