//! Wavefront OBJ parser.
//!
//! Supports `v`, `vt`, `vn` and `f` statements. Face corners may be written
//! as `v`, `v/vt`, `v//vn` or `v/vt/vn`, with 1-based or negative (relative)
//! indices. Polygons are fan-triangulated and identical corners share one
//! output vertex. Other statements (`o`, `g`, `s`, `usemtl`, ...) are ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// CPU-side indexed triangle mesh with one uv and one normal per position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A parse failure at a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ObjParseError {
    pub line: usize,
    pub message: String,
}

/// Key of a face corner: position index plus optional uv and normal indices.
type Corner = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct Parser {
    positions: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    corners: HashMap<Corner, u32>,
    mesh: MeshData,
}

/// Parse OBJ text into an indexed mesh.
pub fn parse_obj(text: &str) -> Result<MeshData, ObjParseError> {
    let mut parser = Parser::default();

    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        let content = raw.split('#').next().unwrap_or_default();
        let mut tokens = content.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        match keyword {
            "v" => {
                let [x, y, z] = floats::<3>(&args, 3, line, "v")?;
                parser.positions.push([x, y, z]);
            }
            "vt" => {
                // v is optional in the format
                let [u, v] = floats::<2>(&args, 1, line, "vt")?;
                parser.uvs.push([u, v]);
            }
            "vn" => {
                let [x, y, z] = floats::<3>(&args, 3, line, "vn")?;
                parser.normals.push([x, y, z]);
            }
            "f" => parser.face(&args, line)?,
            _ => {}
        }
    }

    tracing::debug!(
        vertices = parser.mesh.positions.len(),
        triangles = parser.mesh.triangle_count(),
        "parsed OBJ"
    );
    Ok(parser.mesh)
}

impl Parser {
    fn face(&mut self, args: &[&str], line: usize) -> Result<(), ObjParseError> {
        if args.len() < 3 {
            return Err(err(
                line,
                format!("face needs at least 3 corners, found {}", args.len()),
            ));
        }
        let mut corners = Vec::with_capacity(args.len());
        for token in args {
            let corner = self.corner(token, line)?;
            corners.push(self.vertex_for(corner));
        }
        for i in 1..corners.len() - 1 {
            self.mesh
                .indices
                .extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
        }
        Ok(())
    }

    fn corner(&self, token: &str, line: usize) -> Result<Corner, ObjParseError> {
        let mut parts = token.split('/');
        let v = parts.next().unwrap_or_default();
        let vt = parts.next().filter(|s| !s.is_empty());
        let vn = parts.next().filter(|s| !s.is_empty());
        if parts.next().is_some() {
            return Err(err(line, format!("malformed face corner `{token}`")));
        }

        let v = resolve(v, self.positions.len(), line, "position")?;
        let vt = vt
            .map(|s| resolve(s, self.uvs.len(), line, "uv"))
            .transpose()?;
        let vn = vn
            .map(|s| resolve(s, self.normals.len(), line, "normal"))
            .transpose()?;
        Ok((v, vt, vn))
    }

    fn vertex_for(&mut self, corner: Corner) -> u32 {
        if let Some(&index) = self.corners.get(&corner) {
            return index;
        }
        let (v, vt, vn) = corner;
        let index = self.mesh.positions.len() as u32;
        self.mesh.positions.push(self.positions[v]);
        self.mesh
            .uvs
            .push(vt.map(|i| self.uvs[i]).unwrap_or([0.0, 0.0]));
        self.mesh
            .normals
            .push(vn.map(|i| self.normals[i]).unwrap_or([0.0, 0.0, 0.0]));
        self.corners.insert(corner, index);
        index
    }
}

/// Read up to `N` floats, requiring at least `required`. Missing trailing
/// components are zero.
fn floats<const N: usize>(
    args: &[&str],
    required: usize,
    line: usize,
    keyword: &str,
) -> Result<[f32; N], ObjParseError> {
    if args.len() < required {
        return Err(err(
            line,
            format!("`{keyword}` needs {required} components, found {}", args.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, token) in out.iter_mut().zip(args) {
        *slot = token
            .parse()
            .map_err(|_| err(line, format!("invalid number `{token}` in `{keyword}`")))?;
    }
    Ok(out)
}

/// Map a 1-based or negative OBJ index onto a 0-based index into `len` items.
fn resolve(token: &str, len: usize, line: usize, kind: &str) -> Result<usize, ObjParseError> {
    let raw: i64 = token
        .parse()
        .map_err(|_| err(line, format!("invalid {kind} index `{token}`")))?;
    let index = match raw {
        0 => None,
        r if r > 0 => Some(r as usize - 1),
        r => (len as i64 + r).try_into().ok(),
    };
    match index {
        Some(i) if i < len => Ok(i),
        _ => Err(err(
            line,
            format!("{kind} index {raw} out of range ({len} defined)"),
        )),
    }
}

fn err(line: usize, message: String) -> ObjParseError {
    ObjParseError { line, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "\
# one triangle
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
";

    #[test]
    fn parses_full_corners() {
        let mesh = parse_obj(TRIANGLE).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.uvs[1], [1.0, 0.0]);
        assert_eq!(mesh.normals[2], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn missing_uv_and_normal_are_zero_filled() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 1 0\nf 1//1 2//1 3//1\n";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.uvs, vec![[0.0, 0.0]; 3]);
        assert_eq!(mesh.normals, vec![[0.0, 1.0, 0.0]; 3]);

        let bare = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(bare.normals, vec![[0.0, 0.0, 0.0]; 3]);
        assert_eq!(bare.uvs.len(), bare.positions.len());
    }

    #[test]
    fn negative_indices_are_relative() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.positions, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }

    #[test]
    fn multi_digit_indices() {
        let mut text = String::new();
        for i in 0..12 {
            text.push_str(&format!("v {i} 0 0\n"));
        }
        text.push_str("vt 0.5 0.25\n");
        text.push_str("f 10/1 11/1 12/1\n");
        let mesh = parse_obj(&text).unwrap();
        assert_eq!(mesh.positions[0], [9.0, 0.0, 0.0]);
        assert_eq!(mesh.positions[2], [11.0, 0.0, 0.0]);
        assert_eq!(mesh.uvs[0], [0.5, 0.25]);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let text = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3
f 1 3 4
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn same_position_different_uv_is_split() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 1\nf 1/1 2/1 3/1\nf 1/2 2/1 3/1\n";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn ignores_other_statements_and_comments() {
        let text = "mtllib cube.mtl\no Cube\ng side\ns off\nusemtl Material\n\n\
                    # comment\nv 0 0 0 # trailing\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let bad_number = parse_obj("v 0 0 0\nv 1 x 0\n").unwrap_err();
        assert_eq!(bad_number.line, 2);

        let short_face = parse_obj("v 0 0 0\nv 1 0 0\n\nf 1 2\n").unwrap_err();
        assert_eq!(short_face.line, 4);
        assert!(short_face.message.contains("3 corners"));

        let zero = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").unwrap_err();
        assert_eq!(zero.line, 4);

        let out_of_range = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n").unwrap_err();
        assert!(out_of_range.message.contains("out of range"));

        let too_negative = parse_obj("v 0 0 0\nf -1 -2 -3\n").unwrap_err();
        assert_eq!(too_negative.line, 2);
    }
}
