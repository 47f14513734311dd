// SENTINEL Vantage - Attack Graph Core
// xml.rs - Reasoner attack-graph XML load/save
//
// Wire format, as emitted by the reasoner:
//
//   <attack_graph>
//     <arcs><arc><src>..</src><dst>..</dst></arc>...</arcs>
//     <vertices><vertex><id/><fact/><metric/><type/></vertex>...</vertices>
//   </attack_graph>
//
// CAUTION: the reasoner's files swap src and dst relative to the logical
// derivation direction. The <src> element holds the id of the vertex being
// derived (our arc destination) and <dst> holds the prerequisite (our arc
// source). Both the loader and the writer preserve this inversion so files
// round-trip against reasoner output unchanged.
//
// Copyright (c) 2026 CIPS Corps. All rights reserved.

use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::graph::{AttackGraph, Fact, Vertex, VertexId, VertexType};
use crate::{VantageError, VantageResult};

/// Load an attack graph from a reasoner XML file.
pub fn load_attack_graph(path: &Path) -> VantageResult<AttackGraph> {
    let content = std::fs::read_to_string(path)?;
    load_attack_graph_from_str(&content)
}

/// Load an attack graph from reasoner XML text.
pub fn load_attack_graph_from_str(content: &str) -> VantageResult<AttackGraph> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut graph = AttackGraph::new();

    // (wire src, wire dst) pairs, resolved after all vertices are known.
    let mut wire_arcs: Vec<(VertexId, VertexId)> = Vec::new();

    // Parse state for the element currently being assembled.
    let mut current_tag = String::new();
    let mut arc_src: Option<VertexId> = None;
    let mut arc_dst: Option<VertexId> = None;
    let mut vertex_id: Option<VertexId> = None;
    let mut vertex_fact: Option<String> = None;
    let mut vertex_metric: f64 = 0.0;
    let mut vertex_type: Option<VertexType> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match current_tag.as_str() {
                    "arc" => {
                        arc_src = None;
                        arc_dst = None;
                    }
                    "vertex" => {
                        vertex_id = None;
                        vertex_fact = None;
                        vertex_metric = 0.0;
                        vertex_type = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| VantageError::GraphXml(e.to_string()))?
                    .to_string();
                match current_tag.as_str() {
                    "src" => arc_src = Some(parse_id(&text)?),
                    "dst" => arc_dst = Some(parse_id(&text)?),
                    "id" => vertex_id = Some(parse_id(&text)?),
                    "fact" => vertex_fact = Some(text),
                    "metric" => {
                        vertex_metric = text
                            .parse::<f64>()
                            .map_err(|_| VantageError::GraphXml(format!("bad metric: {text}")))?;
                    }
                    "type" => {
                        vertex_type = Some(VertexType::from_str_upper(&text).ok_or_else(|| {
                            VantageError::GraphXml(format!("unknown vertex type: {text}"))
                        })?);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "arc" => match (arc_src.take(), arc_dst.take()) {
                        (Some(src), Some(dst)) => wire_arcs.push((src, dst)),
                        _ => {
                            return Err(VantageError::GraphXml(
                                "arc element missing src or dst".to_string(),
                            ))
                        }
                    },
                    "vertex" => {
                        let id = vertex_id.take().ok_or_else(|| {
                            VantageError::GraphXml("vertex element missing id".to_string())
                        })?;
                        let raw_fact = vertex_fact.take().ok_or_else(|| {
                            VantageError::GraphXml(format!("vertex {id} missing fact"))
                        })?;
                        let vtype = vertex_type.take().ok_or_else(|| {
                            VantageError::GraphXml(format!("vertex {id} missing type"))
                        })?;
                        let mut vertex = Vertex::new(id, vtype, Fact::parse(&raw_fact)?);
                        vertex.metric = vertex_metric;
                        graph.insert_vertex(vertex);
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(VantageError::Xml(e)),
        }
    }

    // Wire src holds the logical destination, wire dst the logical source.
    for (wire_src, wire_dst) in wire_arcs {
        if !graph.contains(wire_src) {
            return Err(VantageError::VertexNotFound(wire_src));
        }
        if !graph.contains(wire_dst) {
            return Err(VantageError::VertexNotFound(wire_dst));
        }
        graph.add_arc(wire_dst, wire_src);
    }

    Ok(graph)
}

/// Save an attack graph to XML in the reasoner's wire format.
pub fn save_attack_graph(graph: &AttackGraph, path: &Path) -> VantageResult<()> {
    let xml = attack_graph_to_xml(graph)?;
    std::fs::write(path, xml)?;
    Ok(())
}

/// Render an attack graph as reasoner-format XML text.
pub fn attack_graph_to_xml(graph: &AttackGraph) -> VantageResult<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    start(&mut writer, "attack_graph")?;

    start(&mut writer, "arcs")?;
    for arc in graph.arcs() {
        start(&mut writer, "arc")?;
        // Inverted on purpose; see module header.
        text_element(&mut writer, "src", &arc.destination.to_string())?;
        text_element(&mut writer, "dst", &arc.source.to_string())?;
        end(&mut writer, "arc")?;
    }
    end(&mut writer, "arcs")?;

    start(&mut writer, "vertices")?;
    for vertex in graph.vertices() {
        start(&mut writer, "vertex")?;
        text_element(&mut writer, "id", &vertex.id.to_string())?;
        text_element(&mut writer, "fact", &vertex.fact.raw)?;
        text_element(&mut writer, "metric", &vertex.metric.to_string())?;
        text_element(&mut writer, "type", vertex.vertex_type.as_str())?;
        end(&mut writer, "vertex")?;
    }
    end(&mut writer, "vertices")?;

    end(&mut writer, "attack_graph")?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| VantageError::GraphXml(e.to_string()))
}

/// Ids in reasoner files sometimes carry a float rendering ("12.0").
pub(crate) fn parse_id(text: &str) -> VantageResult<VertexId> {
    let value = text
        .parse::<f64>()
        .map_err(|_| VantageError::GraphXml(format!("bad vertex id: {text}")))?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(VantageError::GraphXml(format!("bad vertex id: {text}")));
    }
    Ok(value as VertexId)
}

pub(crate) fn start(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str) -> VantageResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| VantageError::GraphXml(e.to_string()))
}

pub(crate) fn end(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str) -> VantageResult<()> {
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| VantageError::GraphXml(e.to_string()))
}

pub(crate) fn text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    value: &str,
) -> VantageResult<()> {
    start(writer, tag)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| VantageError::GraphXml(e.to_string()))?;
    end(writer, tag)
}
