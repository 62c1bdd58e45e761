//! Binary STL reading and 3MF package writing for the built-in converter.

use crate::services::ServiceError;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::collections::HashMap;
use std::io::{Seek, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const STL_HEADER_LEN: usize = 80;
const STL_TRIANGLE_LEN: usize = 50;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
 <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
 <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>
"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
 <Relationship Target="/3D/3dmodel.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>
"#;

/// Indexed triangle mesh with shared vertices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Parse a binary STL, merging identical vertices.
///
/// ASCII STL is rejected; so is a file whose length disagrees with the
/// triangle count in its header.
pub fn parse_binary_stl(name: &str, bytes: &[u8]) -> Result<Mesh, ServiceError> {
    if bytes.len() < STL_HEADER_LEN + 4 {
        return Err(ServiceError::InvalidGeometry(format!(
            "{name}: too short for a binary STL ({} bytes)",
            bytes.len()
        )));
    }

    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let expected = count
        .checked_mul(STL_TRIANGLE_LEN)
        .and_then(|n| n.checked_add(STL_HEADER_LEN + 4));

    if expected != Some(bytes.len()) {
        if bytes.starts_with(b"solid") {
            return Err(ServiceError::InvalidGeometry(format!(
                "{name}: ASCII STL is not supported by the built-in converter"
            )));
        }
        // Some exporters pad the tail; only a short file is fatal
        if expected.is_none_or(|n| n > bytes.len()) {
            return Err(ServiceError::InvalidGeometry(format!(
                "{name}: header declares {count} triangles but file has {} bytes",
                bytes.len()
            )));
        }
    }

    let mut mesh = Mesh {
        name: name.to_string(),
        ..Mesh::default()
    };
    let mut index: HashMap<[u32; 3], u32> = HashMap::new();

    for triangle in bytes[STL_HEADER_LEN + 4..]
        .chunks_exact(STL_TRIANGLE_LEN)
        .take(count)
    {
        let mut corners = [0u32; 3];
        // Skip the 12-byte facet normal
        for (corner, raw) in corners.iter_mut().zip(triangle[12..48].chunks_exact(12)) {
            let vertex = [read_f32(&raw[0..4]), read_f32(&raw[4..8]), read_f32(&raw[8..12])];
            let key = vertex.map(f32::to_bits);
            *corner = *index.entry(key).or_insert_with(|| {
                mesh.vertices.push(vertex);
                (mesh.vertices.len() - 1) as u32
            });
        }

        // Degenerate facets carry no surface
        if corners[0] != corners[1] && corners[1] != corners[2] && corners[0] != corners[2] {
            mesh.triangles.push(corners);
        }
    }

    if mesh.is_empty() {
        return Err(ServiceError::InvalidGeometry(format!("{name}: no triangles")));
    }

    Ok(mesh)
}

fn read_f32(raw: &[u8]) -> f32 {
    f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

const CORE_NAMESPACE: &str = "http://schemas.microsoft.com/3dmanufacturing/core/2015/02";

/// Render the 3MF core model document: one object per mesh, all in the build.
pub fn model_xml(meshes: &[Mesh]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("model").with_attributes([
        ("unit", "millimeter"),
        ("xml:lang", "en-US"),
        ("xmlns", CORE_NAMESPACE),
    ])))?;
    writer.write_event(Event::Start(BytesStart::new("resources")))?;

    for (i, mesh) in meshes.iter().enumerate() {
        let id = (i + 1).to_string();
        writer.write_event(Event::Start(BytesStart::new("object").with_attributes([
            ("id", id.as_str()),
            ("name", mesh.name.as_str()),
            ("type", "model"),
        ])))?;
        writer.write_event(Event::Start(BytesStart::new("mesh")))?;

        writer.write_event(Event::Start(BytesStart::new("vertices")))?;
        for [x, y, z] in &mesh.vertices {
            let (x, y, z) = (x.to_string(), y.to_string(), z.to_string());
            writer.write_event(Event::Empty(BytesStart::new("vertex").with_attributes([
                ("x", x.as_str()),
                ("y", y.as_str()),
                ("z", z.as_str()),
            ])))?;
        }
        writer.write_event(Event::End(BytesEnd::new("vertices")))?;

        writer.write_event(Event::Start(BytesStart::new("triangles")))?;
        for [a, b, c] in &mesh.triangles {
            let (a, b, c) = (a.to_string(), b.to_string(), c.to_string());
            writer.write_event(Event::Empty(BytesStart::new("triangle").with_attributes([
                ("v1", a.as_str()),
                ("v2", b.as_str()),
                ("v3", c.as_str()),
            ])))?;
        }
        writer.write_event(Event::End(BytesEnd::new("triangles")))?;

        writer.write_event(Event::End(BytesEnd::new("mesh")))?;
        writer.write_event(Event::End(BytesEnd::new("object")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("resources")))?;

    writer.write_event(Event::Start(BytesStart::new("build")))?;
    for i in 0..meshes.len() {
        let id = (i + 1).to_string();
        let item = BytesStart::new("item").with_attributes([("objectid", id.as_str())]);
        writer.write_event(Event::Empty(item))?;
    }
    writer.write_event(Event::End(BytesEnd::new("build")))?;
    writer.write_event(Event::End(BytesEnd::new("model")))?;

    Ok(writer.into_inner())
}

/// Write a 3MF package containing `meshes` to `writer`.
pub fn write_3mf<W: Write + Seek>(writer: W, meshes: &[Mesh]) -> Result<(), ServiceError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(RELS_XML.as_bytes())?;

    zip.start_file("3D/3dmodel.model", options)?;
    zip.write_all(&model_xml(meshes)?)?;

    zip.finish()?;
    Ok(())
}
