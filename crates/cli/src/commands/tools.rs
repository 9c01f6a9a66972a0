use farebot_tools::{reservation_toolset, FieldKind};

/// Lists every registered tool with its argument schema, the same schema the
/// registry validates against at dispatch time.
pub fn run() -> String {
    let mut lines = Vec::new();

    for spec in reservation_toolset() {
        let mode = if spec.read_only { "read-only" } else { "write" };
        lines.push(format!("{} ({mode}) - {}", spec.name, spec.description));
        for field in &spec.fields {
            let requirement = if field.required { "required" } else { "optional" };
            lines.push(format!(
                "    {} [{} {requirement}] {}",
                field.name,
                kind_label(&field.kind),
                field.description,
            ));
        }
    }

    lines.join("\n")
}

fn kind_label(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Text => "text".to_string(),
        FieldKind::Integer => "integer".to_string(),
        FieldKind::Date => "date".to_string(),
        FieldKind::IataCode => "iata".to_string(),
        FieldKind::Choice(choices) => format!("one of {}", choices.join("|")),
    }
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn every_tool_is_listed_with_its_mode() {
        let output = run();
        assert!(output.contains("search_flights (read-only)"));
        assert!(output.contains("book_flight_oneway (write)"));
        assert!(output.contains("ping (read-only)"));
    }

    #[test]
    fn schema_fields_are_rendered() {
        let output = run();
        assert!(output.contains("origin [iata required]"));
        assert!(output.contains("traveller_class [one of ECONOMY|BUSINESS|FIRST optional]"));
    }
}
