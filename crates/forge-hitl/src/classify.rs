use crate::{ActionRequest, ArgMap, HumanInterrupt, HumanInterruptConfig};
use serde_json::Value;

/// Result of inspecting an interrupt payload from the stream layer.
#[derive(Clone, Debug, PartialEq)]
pub enum InterruptValue {
    Structured(HumanInterrupt),
    /// Anything that is not a human interrupt; rendered as opaque data.
    Unstructured(Value),
}

impl InterruptValue {
    pub fn as_human_interrupt(&self) -> Option<&HumanInterrupt> {
        match self {
            Self::Structured(interrupt) => Some(interrupt),
            Self::Unstructured(_) => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

pub fn classify(value: &Value) -> InterruptValue {
    match as_human_interrupt(value) {
        Some(interrupt) => InterruptValue::Structured(interrupt),
        None => InterruptValue::Unstructured(value.clone()),
    }
}

/// Only the lead element of an array payload is considered.
pub fn as_human_interrupt(value: &Value) -> Option<HumanInterrupt> {
    let candidate = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let object = candidate.as_object()?;

    let request = object.get("action_request")?.as_object()?;
    let action = request.get("action")?.as_str()?.to_string();
    // Drafts are built per argument key, so args must be a map when present.
    let args = match request.get("args") {
        None | Some(Value::Null) => ArgMap::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return None,
    };

    let config = object.get("config")?.as_object()?;
    let flag = |name: &str| config.get(name).and_then(Value::as_bool);
    let config = HumanInterruptConfig {
        allow_edit: flag("allow_edit")?,
        allow_respond: flag("allow_respond")?,
        allow_accept: flag("allow_accept")?,
        allow_ignore: flag("allow_ignore")?,
    };

    Some(HumanInterrupt {
        action_request: ActionRequest { action, args },
        config,
        description: object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "action_request": {
                "action": "search_web",
                "args": { "query": "latest AI developments", "max_results": 5 }
            },
            "config": {
                "allow_edit": true,
                "allow_respond": true,
                "allow_accept": true,
                "allow_ignore": false
            },
            "description": "The assistant wants to search the web."
        })
    }

    #[test]
    fn classify_well_formed_payload_expected_structured() {
        let classified = classify(&sample());
        let interrupt = classified
            .as_human_interrupt()
            .expect("payload should classify");
        assert_eq!(interrupt.action_request.action, "search_web");
        assert_eq!(interrupt.action_request.args["max_results"], json!(5));
        assert!(interrupt.config.allow_edit);
        assert!(!interrupt.config.allow_ignore);
        assert_eq!(
            interrupt.description.as_deref(),
            Some("The assistant wants to search the web.")
        );
    }

    #[test]
    fn classify_missing_any_config_flag_expected_unstructured() {
        for flag in ["allow_edit", "allow_respond", "allow_accept", "allow_ignore"] {
            let mut payload = sample();
            payload["config"]
                .as_object_mut()
                .expect("config object")
                .remove(flag);
            assert_eq!(classify(&payload), InterruptValue::Unstructured(payload.clone()));
        }
    }

    #[test]
    fn classify_non_boolean_flag_expected_unstructured() {
        let mut payload = sample();
        payload["config"]["allow_accept"] = json!("true");
        assert!(as_human_interrupt(&payload).is_none());
    }

    #[test]
    fn classify_array_expected_first_element_only() {
        let payload = json!([sample(), { "unrelated": true }]);
        assert!(classify(&payload).is_structured());

        let payload = json!([{ "unrelated": true }, sample()]);
        assert!(!classify(&payload).is_structured());
        assert!(as_human_interrupt(&json!([])).is_none());
    }

    #[test]
    fn classify_scalars_and_null_expected_unstructured() {
        for payload in [Value::Null, json!(42), json!("pause"), json!(true)] {
            assert!(as_human_interrupt(&payload).is_none());
        }
    }

    #[test]
    fn classify_action_must_be_string() {
        let mut payload = sample();
        payload["action_request"]["action"] = json!(7);
        assert!(as_human_interrupt(&payload).is_none());
    }

    #[test]
    fn classify_non_object_args_expected_unstructured() {
        for args in [json!("not a map"), json!([1, 2]), json!(3)] {
            let mut payload = sample();
            payload["action_request"]["args"] = args;
            assert!(!classify(&payload).is_structured());
        }
    }

    #[test]
    fn classify_missing_args_expected_empty_map() {
        let mut payload = sample();
        payload["action_request"]
            .as_object_mut()
            .expect("request object")
            .remove("args");
        let interrupt = as_human_interrupt(&payload).expect("should classify");
        assert!(interrupt.action_request.args.is_empty());
    }
}
