use super::*;

// ============================================================================
// Transcript Commands
// ============================================================================

pub(crate) fn handle_parse(file: &Path, no_collapse: bool, current: &Settings, json: bool) -> Result<(), String> {
    let mut settings = current.clone();
    if no_collapse {
        settings.collapse_consecutive = false;
    }
    let network = load_network(file, &settings)?;
    let records = &network.transcript().records;

    if json {
        return print_json(records);
    }
    for record in records {
        let first_line = record.text.lines().next().unwrap_or("");
        let more = if record.text.contains('\n') { " [...]" } else { "" };
        println!(
            "{:>5}  {}  {}: {}{}",
            record.index,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.user,
            first_line,
            more
        );
    }
    eprintln!("{} messages from {} users", records.len(), network.nodes().len());
    Ok(())
}

pub(crate) fn handle_edges(file: &Path, current: &Settings, json: bool) -> Result<(), String> {
    let network = load_network(file, current)?;
    let edges = network.directed_edges();

    if json {
        return print_json(&edges);
    }
    for edge in &edges {
        println!("{:>5}  {}  {} -> {}", edge.index, edge.time.format("%Y-%m-%d %H:%M"), edge.source, edge.target);
    }
    Ok(())
}

// ============================================================================
// Weighting Commands
// ============================================================================

pub(crate) fn handle_weights(file: &Path, request: &WeightRequest, current: &Settings, json: bool) -> Result<(), String> {
    let network = load_network(file, current)?;
    let report = network.weight_report(request);
    let table = &report.table;

    if json {
        return print_json(table);
    }
    if table.is_empty() {
        println!("No replies between distinct users.");
        return Ok(());
    }

    println!("{:<20} {:<20} {}", "source", "target", table.columns.join("\t"));
    for edge in &table.edges {
        let values: Vec<String> = table
            .columns
            .iter()
            .map(|c| edge.weight(c).map(|w| format!("{:.4}", w)).unwrap_or_else(|| "-".to_string()))
            .collect();
        println!("{:<20} {:<20} {}", edge.source, edge.target, values.join("\t"));
    }

    if request.columns().iter().any(|(_, mode)| mode.needs_null_model()) {
        match &report.model {
            Some(model) if !model.fit.converged => {
                eprintln!(
                    "Warning: null model stopped after {} iterations (distance {:.2e})",
                    model.fit.iterations, model.fit.objective
                );
            }
            None => eprintln!("Note: fewer than two users received replies; no deviation scores."),
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn handle_pairs(file: &Path, request: &WeightRequest, current: &Settings, json: bool) -> Result<(), String> {
    let network = load_network(file, current)?;
    let pairs = network.symmetric_pairs(request);

    if json {
        return print_json(&pairs);
    }
    for pair in &pairs {
        let sides: Vec<String> = request
            .columns()
            .iter()
            .map(|(c, _)| format!("{}: {:.4} / {:.4}", c, pair.forward(c), pair.backward(c)))
            .collect();
        println!("{} <-> {}  {}", pair.source, pair.target, sides.join("  "));
    }
    Ok(())
}

// ============================================================================
// Drawing
// ============================================================================

pub(crate) fn handle_draw(
    file: &Path,
    selected: &[String],
    options: &DrawOptions,
    current: &Settings,
    json: bool,
) -> Result<(), String> {
    let network = load_network(file, current)?;
    let drawing = network.draw(options, selected).map_err(|e| e.to_string())?;

    if json {
        return print_json(&drawing);
    }
    println!("Nodes:");
    for marker in &drawing.markers {
        println!(
            "  {:<30} ({:>7.3}, {:>7.3})  size {:>8.2}  opacity {:.2}",
            marker.name, marker.x, marker.y, marker.size, marker.opacity
        );
    }
    println!("Edges:");
    for edge in &drawing.edges {
        println!("  {}  {}", edge.key, edge.hover.replace(" <br>", "; "));
    }
    Ok(())
}
