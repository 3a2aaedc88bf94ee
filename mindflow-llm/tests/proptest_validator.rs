//! Property-Based Tests for reply validation.

use proptest::prelude::*;

use mindflow_llm::ResponseValidator;

fn arb_field() -> impl Strategy<Value = String> {
    "[a-z\u{4e00}-\u{4e20} ,.!?]{0,24}"
}

proptest! {
    #[test]
    fn parse_never_panics(raw in ".*") {
        let validator = ResponseValidator::new("艾琳", "旅人");
        let reply = validator.parse(&raw);
        prop_assert!(!reply.speak.contains('(') || raw.contains('('));
    }

    #[test]
    fn well_formed_replies_round_trip(desc in arb_field(), think in arb_field(), speak in arb_field()) {
        let raw = serde_json::json!({ "desc": desc, "think": think, "speak": speak }).to_string();
        let fenced = format!("```json\n{raw}\n```");
        let reply = ResponseValidator::try_parse(&fenced).expect("parse");
        prop_assert_eq!(reply.desc, desc);
        prop_assert_eq!(reply.think, think);
        prop_assert_eq!(reply.speak, speak.trim());
    }

    #[test]
    fn speak_never_keeps_balanced_directions(prefix in arb_field(), aside in arb_field(), suffix in arb_field()) {
        let speak = format!("{prefix}（{aside}）{suffix}");
        let raw = serde_json::json!({ "desc": "d", "think": "t", "speak": speak }).to_string();
        let reply = ResponseValidator::try_parse(&raw).expect("parse");
        prop_assert!(!reply.speak.contains('（'));
        prop_assert!(!reply.speak.contains('）'));
    }

    #[test]
    fn missing_field_always_falls_back(desc in arb_field(), think in arb_field()) {
        let validator = ResponseValidator::new("艾琳", "旅人");
        let raw = serde_json::json!({ "desc": desc, "think": think }).to_string();
        prop_assert_eq!(validator.parse(&raw), validator.fallback());
    }
}
