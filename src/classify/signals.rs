use crate::inference::Label;

/// Boolean observations parsed out of one frame's labels, plus the threat score
/// accumulated while parsing them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    pub multiple_people: bool,
    pub fist_visible: bool,
    pub punching: bool,
    pub weapon: bool,
    pub person_down: bool,
    pub score: u32,
}

struct Trigger {
    needles: &'static [&'static str],
    delta: u32,
    set: fn(&mut Signals),
}

const TRIGGERS: &[Trigger] = &[
    Trigger {
        needles: &["more than one", "multiple"],
        delta: 0,
        set: |s| s.multiple_people = true,
    },
    Trigger {
        needles: &["fist"],
        delta: 1,
        set: |s| s.fist_visible = true,
    },
    Trigger {
        needles: &["punching", "extended"],
        delta: 1,
        set: |s| s.punching = true,
    },
    Trigger {
        needles: &["weapon"],
        delta: 5,
        set: |s| s.weapon = true,
    },
    Trigger {
        needles: &["ground", "lying"],
        delta: 2,
        set: |s| s.person_down = true,
    },
];

/// Parse labels into signals.
///
/// Each label contributes on its own: a label matching a trigger sets the
/// signal and adds the trigger's weight, so repeated mentions across labels
/// keep adding to the score. Negated labels contribute nothing.
pub fn extract_signals(labels: &[Label]) -> Signals {
    let mut signals = Signals::default();
    for label in labels {
        let answer = label.answer.to_lowercase();
        let combined = format!("{} {}", label.category.to_lowercase(), answer);
        log::debug!("inference label: {}", combined);

        if is_negative(&answer) {
            continue;
        }
        for trigger in TRIGGERS {
            if trigger.needles.iter().any(|needle| combined.contains(needle)) {
                (trigger.set)(&mut signals);
                signals.score += trigger.delta;
            }
        }
    }
    signals
}

/// True when the answer contains "no" or "none" as a standalone word.
pub fn is_negative(answer: &str) -> bool {
    answer
        // Punctuation ends a word too, so "No." and "no-one" are negative.
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("no") || word.eq_ignore_ascii_case("none"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(category: &str, answer: &str) -> Label {
        Label::new(category, answer)
    }

    #[test]
    fn negation_is_whole_word_only() {
        assert!(is_negative("no"));
        assert!(is_negative("No weapon visible"));
        assert!(is_negative("none."));
        assert!(is_negative("answer: no"));
        assert!(is_negative("No."));
        assert!(is_negative("no-one nearby"));
        assert!(!is_negative("nothing unusual"));
        assert!(!is_negative("nonexistent"));
        assert!(!is_negative("knot"));
        assert!(!is_negative(""));
    }

    #[test]
    fn negated_label_sets_nothing_even_with_trigger_text() {
        let signals = extract_signals(&[label("weapon check", "no weapon, fist or punching")]);
        assert_eq!(signals, Signals::default());
    }

    #[test]
    fn category_text_can_trigger_a_signal() {
        let signals = extract_signals(&[label("Is someone lying on the ground?", "Yes")]);
        assert!(signals.person_down);
        assert_eq!(signals.score, 2);
    }

    #[test]
    fn one_label_can_set_several_signals() {
        let signals = extract_signals(&[label("gesture", "fist extended, punching")]);
        assert!(signals.fist_visible);
        assert!(signals.punching);
        assert_eq!(signals.score, 2);
    }

    #[test]
    fn score_accumulates_per_label() {
        let signals = extract_signals(&[
            label("left hand", "fist"),
            label("right hand", "fist"),
            label("people", "multiple people"),
        ]);
        assert!(signals.fist_visible);
        assert!(signals.multiple_people);
        assert_eq!(signals.score, 2);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let signals = extract_signals(&[label("WEAPON CHECK", "Weapon Visible: KNIFE")]);
        assert!(signals.weapon);
        assert_eq!(signals.score, 5);
    }
}
