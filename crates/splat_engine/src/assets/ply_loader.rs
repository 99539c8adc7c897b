//! PLY reader for 3D Gaussian-Splatting captures
//!
//! Vertex records are decoded through `ply-rs` into a fixed-size record and then
//! scattered into the planar arrays of a [`SplatSet`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ply_rs::parser::Parser;
use ply_rs::ply::{Property, PropertyAccess};

use super::{AssetError, AssetResult, SplatSet, MAX_SH_COEFFS_PER_CHANNEL};

const REQUIRED_PROPERTIES: [&str; 14] = [
    "x", "y", "z",
    "f_dc_0", "f_dc_1", "f_dc_2",
    "opacity",
    "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

struct SplatRecord {
    position: [f32; 3],
    base_color: [f32; 3],
    /// Indexed by the `f_rest_N` suffix, sized by the highest index seen
    sh_rest: Vec<f32>,
    opacity: f32,
    scale: [f32; 3],
    rotation: [f32; 4],
}

impl PropertyAccess for SplatRecord {
    fn new() -> Self {
        Self {
            position: [0.0; 3],
            base_color: [0.0; 3],
            sh_rest: Vec::new(),
            opacity: 0.0,
            scale: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    fn set_property(&mut self, key: String, property: Property) {
        let value = match property {
            Property::Float(v) => v,
            Property::Double(v) => v as f32,
            _ => return,
        };

        match key.as_str() {
            "x" => self.position[0] = value,
            "y" => self.position[1] = value,
            "z" => self.position[2] = value,
            "f_dc_0" => self.base_color[0] = value,
            "f_dc_1" => self.base_color[1] = value,
            "f_dc_2" => self.base_color[2] = value,
            "opacity" => self.opacity = value,
            "scale_0" => self.scale[0] = value,
            "scale_1" => self.scale[1] = value,
            "scale_2" => self.scale[2] = value,
            "rot_0" => self.rotation[0] = value,
            "rot_1" => self.rotation[1] = value,
            "rot_2" => self.rotation[2] = value,
            "rot_3" => self.rotation[3] = value,
            _ => {
                if let Some(index) = key.strip_prefix("f_rest_").and_then(|i| i.parse::<usize>().ok()) {
                    if index >= self.sh_rest.len() {
                        self.sh_rest.resize(index + 1, 0.0);
                    }
                    self.sh_rest[index] = value;
                }
            }
        }
    }
}

/// Load a splat PLY file from disk
pub fn load_ply(path: impl AsRef<Path>, convert_to_rub: bool) -> AssetResult<SplatSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let splats = parse_ply(&mut reader, convert_to_rub)?;
    log::info!(
        "Loaded {} splats (SH degree {}) from {}",
        splats.len(),
        splats.max_sh_degree(),
        path.display()
    );
    Ok(splats)
}

/// Parse a splat PLY stream (ASCII or binary)
pub fn parse_ply<R: BufRead>(reader: &mut R, convert_to_rub: bool) -> AssetResult<SplatSet> {
    let parser = Parser::<SplatRecord>::new();
    let header = parser.read_header(reader)?;

    let vertex = header
        .elements
        .get("vertex")
        .ok_or(AssetError::MissingVertexElement)?;

    if let Some(missing) = REQUIRED_PROPERTIES
        .iter()
        .find(|name| !vertex.properties.contains_key(**name))
    {
        return Err(AssetError::MissingProperty((*missing).to_string()));
    }

    // Stored as all red, then green, then blue; a partial triple is ignored.
    let file_per_channel = vertex
        .properties
        .keys()
        .filter(|name| name.starts_with("f_rest_"))
        .count()
        / 3;
    let per_channel = file_per_channel.min(MAX_SH_COEFFS_PER_CHANNEL);
    if per_channel < file_per_channel {
        log::debug!(
            "Keeping {per_channel} of {file_per_channel} higher-order coefficients per channel"
        );
    }

    let records = parser.read_payload_for_element(reader, vertex, &header)?;

    let mut splats = SplatSet::with_capacity(records.len(), per_channel);
    for record in &records {
        splats.positions.extend_from_slice(&record.position);
        splats.base_color.extend_from_slice(&record.base_color);
        for channel in 0..3 {
            let start = channel * file_per_channel;
            splats.sh_rest.extend(
                (start..start + per_channel).map(|i| record.sh_rest.get(i).copied().unwrap_or(0.0)),
            );
        }
        splats.opacity.push(record.opacity);
        splats.scale.extend_from_slice(&record.scale);
        splats.rotation.extend_from_slice(&record.rotation);
    }
    splats.validate()?;

    if convert_to_rub {
        splats.convert_rdf_to_rub();
    }

    Ok(splats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ascii_ply(rest: usize, rows: &[&str]) -> String {
        let mut text = format!("ply\nformat ascii 1.0\nelement vertex {}\n", rows.len());
        for name in ["x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2"] {
            text.push_str(&format!("property float {name}\n"));
        }
        for i in 0..rest {
            text.push_str(&format!("property float f_rest_{i}\n"));
        }
        for name in ["opacity", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3"] {
            text.push_str(&format!("property float {name}\n"));
        }
        text.push_str("end_header\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_degree_zero() {
        let text = ascii_ply(0, &[
            "1 2 3 0.1 0.2 0.3 0.5 -1 -2 -3 1 0 0 0",
            "4 5 6 0.4 0.5 0.6 0.9 -4 -5 -6 0 1 0 0",
        ]);
        let splats = parse_ply(&mut Cursor::new(text), false).unwrap();
        assert_eq!(splats.len(), 2);
        assert_eq!(splats.max_sh_degree(), 0);
        assert_eq!(splats.positions, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(splats.scale[3..], [-4.0, -5.0, -6.0]);
        assert_eq!(splats.rotation[4..], [0.0, 1.0, 0.0, 0.0]);
        assert!(splats.sh_rest.is_empty());
    }

    #[test]
    fn test_parse_degree_one_keeps_channel_layout() {
        let text = ascii_ply(9, &["0 0 0 0 0 0 1 2 3 4 5 6 7 8 9 0.5 0 0 0 1 0 0 0"]);
        let splats = parse_ply(&mut Cursor::new(text), false).unwrap();
        assert_eq!(splats.max_sh_degree(), 1);
        assert_eq!(splats.sh_rest, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_parse_degree_four_keeps_first_fifteen_per_channel() {
        let rest: Vec<String> = (0..72).map(|i| i.to_string()).collect();
        let row = format!("0 0 0 0 0 0 {} 0.5 0 0 0 1 0 0 0", rest.join(" "));
        let text = ascii_ply(72, &[row.as_str(), row.as_str()]);
        let splats = parse_ply(&mut Cursor::new(text), false).unwrap();

        assert_eq!(splats.sh_coeffs_per_channel(), 15);
        assert_eq!(splats.max_sh_degree(), 3);
        let expected: Vec<f32> = (0..3)
            .flat_map(|channel| (channel * 24..channel * 24 + 15).map(|i| i as f32))
            .collect();
        assert_eq!(splats.sh_rest[..45], expected[..]);
        assert_eq!(splats.sh_rest[45..], expected[..]);
    }

    #[test]
    fn test_parse_converts_to_rub() {
        let text = ascii_ply(0, &["1 2 3 0 0 0 0 0 0 0 1 0.5 0.25 0.125"]);
        let splats = parse_ply(&mut Cursor::new(text), true).unwrap();
        assert_eq!(splats.positions, vec![1.0, -2.0, -3.0]);
        assert_eq!(splats.rotation, vec![1.0, 0.5, -0.25, -0.125]);
    }

    #[test]
    fn test_missing_property_is_reported() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nend_header\n0 0\n";
        match parse_ply(&mut Cursor::new(text), false) {
            Err(AssetError::MissingProperty(name)) => assert_eq!(name, "z"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_vertex_element() {
        let text = "ply\nformat ascii 1.0\nelement face 0\nproperty list uchar int vertex_indices\nend_header\n";
        assert!(matches!(
            parse_ply(&mut Cursor::new(text), false),
            Err(AssetError::MissingVertexElement)
        ));
    }

    #[test]
    fn test_empty_vertex_element() {
        let text = ascii_ply(0, &[]);
        let splats = parse_ply(&mut Cursor::new(text), true).unwrap();
        assert!(splats.is_empty());
        assert_eq!(splats.max_sh_degree(), -1);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(load_ply("no/such/scene.ply", true), Err(AssetError::Io(_))));
    }
}
