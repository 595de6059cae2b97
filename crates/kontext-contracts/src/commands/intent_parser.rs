use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::command_registry::{
    CommandSpec, GENERATE_COMMAND, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS, NUMBER_ARG_COMMANDS,
    PARAM_COMMAND, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args.get(key).and_then(Value::as_str)
    }

    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.command_args.get(key).and_then(Value::as_u64)
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_spec(command: &str, specs: &[CommandSpec]) -> Option<CommandSpec> {
    specs.iter().find(|spec| spec.command == command).copied()
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn parse_number(arg: &str) -> Value {
    let trimmed = arg.trim().trim_end_matches('%').trim_end_matches("px");
    trimmed
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or(Value::Null)
}

/// `key=value` pairs; bare keys become `true`, malformed pairs are skipped.
pub fn parse_param_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Map<String, Value> {
    let mut params = Map::new();
    for part in pairs {
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (key.trim(), Value::String(value.trim().to_string())),
            None => (part.trim(), Value::Bool(true)),
        };
        if key.is_empty() {
            continue;
        }
        params.insert(key.to_string(), value);
    }
    params
}

fn parse_params(arg: &str) -> Map<String, Value> {
    parse_param_pairs(split_args(arg).iter().map(String::as_str))
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if command == GENERATE_COMMAND {
                let mut intent = Intent::new("generate", text);
                intent.prompt = (!arg.is_empty()).then(|| arg.to_string());
                return intent;
            }

            if command == PARAM_COMMAND {
                return Intent::new("set_params", text)
                    .with_arg("params", Value::Object(parse_params(arg)));
            }

            if let Some(spec) = find_spec(&command, RAW_ARG_COMMANDS) {
                return Intent::new(spec.action, text)
                    .with_arg(spec.arg_key, Value::String(arg.to_string()));
            }

            if let Some(spec) = find_spec(&command, NUMBER_ARG_COMMANDS) {
                return Intent::new(spec.action, text).with_arg(spec.arg_key, parse_number(arg));
            }

            if let Some(spec) = find_spec(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(spec.action, text)
                    .with_arg(spec.arg_key, Value::String(parse_single_arg(arg)));
            }

            if let Some(spec) = find_spec(&command, MULTI_PATH_COMMANDS) {
                return Intent::new(spec.action, text).with_arg(
                    spec.arg_key,
                    Value::Array(split_args(arg).into_iter().map(Value::String).collect()),
                );
            }

            if let Some(spec) = find_spec(&command, NO_ARG_COMMANDS) {
                return Intent::new(spec.action, text);
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{parse_intent, parse_param_pairs as split_param_pairs};

    #[test]
    fn plain_text_is_a_generate_prompt() {
        let intent = parse_intent("  a red fox in the snow ");
        assert_eq!(intent.action, "generate");
        assert_eq!(intent.prompt.as_deref(), Some("a red fox in the snow"));

        let slash = parse_intent("/generate");
        assert_eq!(slash.action, "generate");
        assert_eq!(slash.prompt, None);
    }

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_drop_quoted_paths() {
        let intent = parse_intent("/drop \"/tmp/a b.png\" notes.txt");
        assert_eq!(intent.action, "drop_files");
        assert_eq!(intent.command_args["paths"], json!(["/tmp/a b.png", "notes.txt"]));
        assert_eq!(intent.arg_list("paths").len(), 2);

        let reference = parse_intent("/reference ref.png");
        assert_eq!(reference.action, "drop_reference");
        assert_eq!(reference.arg_list("paths"), vec!["ref.png"]);
    }

    #[test]
    fn parse_selection_and_delete_commands() {
        let select = parse_intent("/select img_1 img_2");
        assert_eq!(select.action, "select");
        assert_eq!(select.arg_list("ids"), vec!["img_1", "img_2"]);

        let delete = parse_intent("/delete img_1");
        assert_eq!(delete.action, "delete");
        assert_eq!(delete.arg_str("id"), Some("img_1"));

        assert_eq!(parse_intent("/delete_selected").action, "delete_selected");
        assert_eq!(parse_intent("/SELECT_ALL").action, "select_all");
    }

    #[test]
    fn parse_numeric_commands() {
        assert_eq!(parse_intent("/count 3").arg_u64("count"), Some(3));
        assert_eq!(parse_intent("/zoom 150%").arg_u64("zoom"), Some(150));
        assert_eq!(parse_intent("/width 1300px").arg_u64("width"), Some(1300));
        assert_eq!(parse_intent("/count many").command_args["count"], json!(null));
    }

    #[test]
    fn parse_raw_commands() {
        let method = parse_intent("/method juggernaut-pro");
        assert_eq!(method.action, "set_method");
        assert_eq!(method.arg_str("method"), Some("juggernaut-pro"));

        let view = parse_intent("/view");
        assert_eq!(view.action, "set_view");
        assert_eq!(view.arg_str("mode"), Some(""));
    }

    #[test]
    fn parse_param_pairs() {
        let intent = parse_intent("/param strength=0.5 \"output_format = png\" sync_mode =x");
        assert_eq!(intent.action, "set_params");
        assert_eq!(
            intent.command_args["params"],
            json!({"strength": "0.5", "output_format": "png", "sync_mode": true})
        );
    }

    #[test]
    fn param_pairs_from_separate_arguments() {
        let params =
            split_param_pairs(["strength=0.5", " output_format = png", "raw_output", "=x"]);
        assert_eq!(
            Value::Object(params),
            json!({"strength": "0.5", "output_format": "png", "raw_output": true})
        );
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
