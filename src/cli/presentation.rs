//! CLI presentation: tables, headings and interactive prompts.

use crate::card::{Contact, GpsFix, EMAIL_ADDRESS};
use crate::config::ValidationError;
use crate::error::{CardpostError, EncodingError};
use crate::probe::{ModuleChooser, ModuleId, ModuleInfo};
use crate::settings::Settings;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn contact(contact: &Contact) -> String {
    match (contact.get("first_name"), contact.get(EMAIL_ADDRESS)) {
        (Some(name), Some(email)) => format!("{} <{}>", name, email),
        (None, Some(email)) => email.clone(),
        (Some(name), None) => name.clone(),
        (None, None) => "-".to_string(),
    }
}

pub fn format_settings_table(settings: &Settings) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Setting", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("access_point", optional(settings.access_point)),
        ("scanning_disabled", settings.scanning_disabled.to_string()),
        (
            "proximity_scan_enabled",
            settings.proximity_scan_enabled.to_string(),
        ),
        ("gps_scan_enabled", settings.gps_scan_enabled.to_string()),
        (
            "store_instead_of_send",
            settings.store_instead_of_send.to_string(),
        ),
        ("positioning_module", optional(settings.positioning_module)),
        ("debug", settings.debug.to_string()),
        ("mood", settings.mood.clone()),
        ("sender", contact(&settings.sender)),
        ("recipient", contact(&settings.recipient)),
        (
            "photo",
            optional(settings.photo.as_ref().map(|p| p.display().to_string())),
        ),
    ];
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value]);
    }
    format!("{}\n\n{}", format_section_heading("Settings"), table)
}

pub fn format_settings_json(settings: &Settings) -> Result<String, CardpostError> {
    serde_json::to_string_pretty(settings)
        .map_err(|e| CardpostError::Encoding(EncodingError::Json(e)))
}

pub fn format_modules_table(modules: &[ModuleInfo], current: ModuleId) -> String {
    if modules.is_empty() {
        return "No positioning modules available.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Name", "In use"]);
    for module in modules {
        let in_use = if module.id == current {
            format!("{}", "yes".green())
        } else {
            String::new()
        };
        table.add_row(vec![module.id.to_string(), module.name.clone(), in_use]);
    }
    format!(
        "{}\n\n{}",
        format_section_heading("Positioning modules"),
        table
    )
}

pub fn format_fix(fix: &GpsFix) -> String {
    let p = &fix.position;
    let mut line = format!("lat {:.6} lon {:.6}", p.latitude, p.longitude);
    if p.altitude.is_finite() {
        line.push_str(&format!(" alt {:.1} m", p.altitude));
    }
    if p.horizontal_accuracy.is_finite() {
        line.push_str(&format!(" (±{:.0} m)", p.horizontal_accuracy));
    }
    if let Some(course) = &fix.course {
        if course.speed.is_finite() {
            line.push_str(&format!(" speed {:.1} m/s", course.speed));
        }
    }
    line
}

pub fn format_validation_errors(errors: &[ValidationError]) -> String {
    let mut out = format!(
        "{} ({}):",
        "Configuration invalid".red().bold(),
        errors.len()
    );
    for e in errors {
        out.push_str(&format!("\n  - {}", e));
    }
    out
}

/// Module chooser backed by a terminal selection prompt
pub struct DialoguerChooser;

impl ModuleChooser for DialoguerChooser {
    fn choose(&self, modules: &[ModuleInfo]) -> Option<usize> {
        if modules.is_empty() {
            return None;
        }
        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        match dialoguer::Select::new()
            .with_prompt("Positioning module")
            .items(&names)
            .default(0)
            .interact_opt()
        {
            Ok(choice) => choice,
            Err(e) => {
                tracing::warn!(error = %e, "Module selection failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{private_recipient, Position};

    #[test]
    fn settings_table_lists_every_key() {
        let out = format_settings_table(&Settings::default());
        for key in ["access_point", "store_instead_of_send", "recipient"] {
            assert!(out.contains(key), "missing {}", key);
        }
        assert!(out.contains(&contact(&private_recipient())));
    }

    #[test]
    fn fix_omits_unknown_values() {
        let fix = GpsFix {
            position: Position {
                latitude: 60.17,
                longitude: 24.94,
                altitude: f64::NAN,
                horizontal_accuracy: 15.0,
                vertical_accuracy: f64::NAN,
            },
            course: None,
        };
        assert_eq!(format_fix(&fix), "lat 60.170000 lon 24.940000 (±15 m)");
    }

    #[test]
    fn empty_module_list() {
        assert_eq!(
            format_modules_table(&[], 1),
            "No positioning modules available."
        );
    }
}
