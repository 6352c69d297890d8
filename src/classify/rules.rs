use super::signals::Signals;
use super::ThreatStatus;

/// One row of the decision table.
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&Signals) -> bool,
    pub status: ThreatStatus,
    pub detail: &'static str,
}

/// Decision table, evaluated top to bottom. Several predicates can hold at
/// once, so the order is part of the behavior.
pub const RULES: &[Rule] = &[
    Rule {
        name: "weapon",
        applies: |s| s.weapon,
        status: ThreatStatus::WeaponDetected,
        detail: "Lethal threat identified",
    },
    Rule {
        name: "solo_person_down",
        applies: |s| !s.multiple_people && s.person_down,
        status: ThreatStatus::PersonDown,
        detail: "Subject on floor (Medical)",
    },
    Rule {
        name: "solo_subject",
        applies: |s| !s.multiple_people,
        status: ThreatStatus::Secure,
        detail: "Solo Subject (Safe)",
    },
    Rule {
        name: "group_fighting",
        applies: |s| s.multiple_people && s.punching,
        status: ThreatStatus::ThreatDetected,
        detail: "Active Fighting Detected",
    },
    Rule {
        name: "group_aggressive_stance",
        applies: |s| s.multiple_people && s.fist_visible,
        status: ThreatStatus::Suspicious,
        detail: "Aggressive Stance",
    },
    Rule {
        name: "group_person_down",
        applies: |s| s.multiple_people && s.person_down,
        status: ThreatStatus::PersonDown,
        detail: "Subject on floor",
    },
    Rule {
        name: "group_interaction",
        applies: |_| true,
        status: ThreatStatus::Secure,
        detail: "Group Interaction (Safe)",
    },
];

/// First rule whose predicate holds. The last rule always applies.
pub fn first_match(signals: &Signals) -> &'static Rule {
    RULES
        .iter()
        .find(|rule| (rule.applies)(signals))
        .unwrap_or(&RULES[RULES.len() - 1])
}
