/// What the service is asked to look at.
pub const OBJECTS_OF_INTEREST: &str = "people, arms, and context";

/// Yes/no questions the service answers as class labels.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Is there more than one person visible in the frame? (Yes/No)",
    "Is a human hand formed into a fist? (Yes/No)",
    "Is an arm extended in a punching motion? (Yes/No)",
    "Is a weapon visible? (Yes/No)",
    "Is someone lying on the ground? (Yes/No)",
];

/// Prompt sent with every frame.
pub fn build_prompt(objects: &str, questions: &[&str]) -> String {
    format!(
        "SECURITY ANALYSIS. Analyze {objects}. \
         Step 1: Count the people. If there is only ONE person and NO WEAPON, it is SAFE (Shadow Boxing/Exercise). \
         Step 2: If there are TWO+ people and a fist/punch, it is a THREAT. \
         Determine: {questions}. Report values as classLabels.",
        objects = objects,
        questions = questions.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_question() {
        let prompt = build_prompt(OBJECTS_OF_INTEREST, DEFAULT_QUESTIONS);
        assert!(prompt.starts_with("SECURITY ANALYSIS. Analyze people, arms, and context."));
        for question in DEFAULT_QUESTIONS {
            assert!(prompt.contains(question), "missing {question}");
        }
        assert!(prompt.ends_with("Report values as classLabels."));
    }
}
