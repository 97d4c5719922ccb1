use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, trace};

use crate::error::{ParseError, Result};
use crate::types::{unknown, GpuRecord, HostTelemetry, ProcessRecord, UsagePercent, UNKNOWN};

/// Parse the XML document printed by `nvidia-smi -q -x`.
///
/// Missing fields resolve to [`UNKNOWN`]; only empty input and documents that
/// are not well-formed XML are errors.
pub fn parse(raw: &str) -> Result<HostTelemetry> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    // nvidia-smi emits a DOCTYPE line referencing its DTD
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(raw, options)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;
    let root = document.root_element();

    let gpus: Vec<GpuRecord> = gpu_nodes(root).map(parse_gpu).collect();
    debug!("Parsed telemetry for {} GPU(s)", gpus.len());

    Ok(HostTelemetry {
        driver_version: text_at(root, &["driver_version"]),
        cuda_version: text_at(root, &["cuda_version"]),
        gpus,
    })
}

/// Outermost `<gpu>` elements in document order
fn gpu_nodes<'a, 'input>(root: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    root.descendants().filter(|node| {
        node.has_tag_name("gpu") && !node.ancestors().skip(1).any(|a| a.has_tag_name("gpu"))
    })
}

fn parse_gpu(gpu: Node<'_, '_>) -> GpuRecord {
    let mut record = GpuRecord {
        id: gpu.attribute("id").unwrap_or(UNKNOWN).to_string(),
        name: text_at(gpu, &["product_name"]),
        uuid: text_at(gpu, &["uuid"]),
        temperature: text_at(gpu, &["temperature", "gpu_temp"]),
        power_draw: text_at(gpu, &["power_readings", "power_draw"]),
        power_limit: text_at(gpu, &["power_readings", "power_limit"]),
        ..GpuRecord::default()
    };

    if let Some(memory) = descendant(gpu, "fb_memory_usage") {
        record.memory_total = text_at(memory, &["total"]);
        record.memory_used = text_at(memory, &["used"]);
        record.memory_free = text_at(memory, &["free"]);
        record.memory_usage_percent =
            UsagePercent::from_readings(&record.memory_used, &record.memory_total);
    }

    if let Some(utilization) = descendant(gpu, "utilization") {
        record.gpu_utilization = text_at(utilization, &["gpu_util"]);
        record.memory_utilization = text_at(utilization, &["memory_util"]);
    }

    if let Some(processes) = descendant(gpu, "processes") {
        record.processes = processes
            .descendants()
            .filter(|node| node.has_tag_name("process_info"))
            .map(parse_process)
            .collect();
    }

    trace!("GPU {} ({}): {} process(es)", record.id, record.name, record.processes.len());
    record
}

fn parse_process(info: Node<'_, '_>) -> ProcessRecord {
    ProcessRecord {
        pid: text_at(info, &["pid"]),
        process_type: text_at(info, &["type"]),
        process_name: text_at(info, &["process_name"]),
        used_memory: text_at(info, &["used_memory"]),
        ..ProcessRecord::default()
    }
}

/// First element named `name` below `node`, at any depth
fn descendant<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants()
        .skip(1)
        .find(|candidate| candidate.has_tag_name(name))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|candidate| candidate.has_tag_name(name))
}

/// Text of the element at `path`: the first segment is searched at any depth,
/// later segments are direct children. Empty or missing text gives [`UNKNOWN`].
fn text_at(node: Node<'_, '_>, path: &[&str]) -> String {
    let Some((first, rest)) = path.split_first() else {
        return unknown();
    };

    rest.iter()
        .fold(descendant(node, first), |current, segment| {
            current.and_then(|n| child(n, segment))
        })
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(unknown)
}
