use super::*;

// ============================================================================
// Config Commands
// ============================================================================

fn setting_value(settings: &Settings, key: &str) -> Result<serde_json::Value, String> {
    let all = serde_json::to_value(settings).map_err(|e| e.to_string())?;
    all.get(key)
        .cloned()
        .ok_or_else(|| format!("Unknown setting: {}. Known: {}", key, Settings::KEYS.join(", ")))
}

fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_report(key: &str, value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "key": key, "value": value })
}

pub(crate) fn handle_config(cmd: ConfigCommands, json: bool) -> Result<(), String> {
    match cmd {
        ConfigCommands::Show => {
            let current = settings::get();
            if json {
                return print_json(&current);
            }
            for key in Settings::KEYS {
                println!("{:<26} {}", format!("{}:", key), display(&setting_value(&current, key)?));
            }
            if let Ok(v) = std::env::var(settings::HEADER_LINES_ENV) {
                println!("({} overrides header_lines with {:?})", settings::HEADER_LINES_ENV, v);
            }
        }
        ConfigCommands::Get { key } => {
            let value = setting_value(&settings::get(), &key)?;
            if json {
                println!("{}", value);
            } else {
                println!("{}", display(&value));
            }
        }
        ConfigCommands::Set { key, value } => {
            settings::set_value(&key, &value).map_err(|e| e.to_string())?;
            if json {
                println!("{}", set_report(&key, setting_value(&settings::get(), &key)?));
            } else {
                println!("{} = {}", key, display(&setting_value(&settings::get(), &key)?));
            }
        }
        ConfigCommands::Path => {
            let path = settings::config_path().ok_or("Settings not initialized")?;
            if json {
                println!("{}", serde_json::json!({ "path": path }));
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_report_is_valid_json() {
        let report = set_report("say \"hola\" ñ\u{7f}", serde_json::json!("Señor \\ x"));
        let parsed: serde_json::Value = serde_json::from_str(&report.to_string()).unwrap();
        assert_eq!(parsed["key"], "say \"hola\" ñ\u{7f}");
        assert_eq!(parsed["value"], "Señor \\ x");
    }

    #[test]
    fn test_setting_value_lookup() {
        let settings = Settings::default();
        assert_eq!(setting_value(&settings, "size_by").unwrap(), serde_json::json!("count"));
        assert!(setting_value(&settings, "nope").is_err());
    }
}
