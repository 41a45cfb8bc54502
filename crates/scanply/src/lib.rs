//! scanply: point-cloud scans stored as PLY, decoded into flat vertex records.
//!
//! - Supports `format ascii 1.0` and `format binary_little_endian 1.0`.
//! - The `vertex` element must carry `x`, `y`, `z` (any scalar type).
//! - Colour comes from `red green blue` (integers are normalised by their type's
//!   max, floats are taken as-is) or, for Gaussian-splat style exports, from the
//!   spherical-harmonic DC terms `f_dc_0 f_dc_1 f_dc_2`.
//! - Every other element and property is skipped, list properties included.
//!
//! The decoded unit is [`VertexRecord`]: 24 bytes, position then colour, laid out
//! to be uploaded to a GPU vertex buffer without conversion.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Grey used for scans without any colour properties.
pub const DEFAULT_COLOR: [f32; 3] = [0.7, 0.7, 0.7];

/// One point of a scan. Must match the per-instance inputs of the viewer's point shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexRecord {
    /// Position in scan units (metres for the foot scanner).
    pub position: [f32; 3],
    /// Linear RGB, each channel in [0, 1].
    pub color: [f32; 3],
}

impl VertexRecord {
    /// Size of one record in bytes.
    pub const SIZE: usize = std::mem::size_of::<VertexRecord>();

    #[inline]
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Axis-aligned bounds of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Half the diagonal; the radius of a sphere enclosing the box.
    pub fn radius(&self) -> f32 {
        let dx = self.max[0] - self.min[0];
        let dy = self.max[1] - self.min[1];
        let dz = self.max[2] - self.min[2];
        (dx * dx + dy * dy + dz * dz).sqrt() * 0.5
    }
}

/// Bounds of all records, or `None` for an empty set.
pub fn bounds(records: &[VertexRecord]) -> Option<Bounds> {
    let first = records.first()?;
    let init = Bounds {
        min: first.position,
        max: first.position,
    };
    Some(records.iter().fold(init, |mut b, r| {
        for i in 0..3 {
            b.min[i] = b.min[i].min(r.position[i]);
            b.max[i] = b.max[i].max(r.position[i]);
        }
        b
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    /// Divisor that maps an integer colour channel onto [0, 1].
    fn color_scale(self) -> f64 {
        match self {
            Self::U8 | Self::I8 => 255.0,
            Self::U16 | Self::I16 => 65_535.0,
            Self::U32 | Self::I32 => u32::MAX as f64,
            Self::F32 | Self::F64 => 1.0,
        }
    }

    /// Encoded width in a binary body.
    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn read_le(self, buf: &mut &[u8]) -> io::Result<f64> {
        Ok(match self {
            Self::I8 => i8::from_le_bytes(array(buf)?) as f64,
            Self::U8 => u8::from_le_bytes(array(buf)?) as f64,
            Self::I16 => i16::from_le_bytes(array(buf)?) as f64,
            Self::U16 => u16::from_le_bytes(array(buf)?) as f64,
            Self::I32 => i32::from_le_bytes(array(buf)?) as f64,
            Self::U32 => u32::from_le_bytes(array(buf)?) as f64,
            Self::F32 => f32::from_le_bytes(array(buf)?) as f64,
            Self::F64 => f64::from_le_bytes(array(buf)?),
        })
    }
}

#[derive(Debug, Clone)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { count_ty: ScalarType, item_ty: ScalarType },
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    format: Format,
    elements: Vec<Element>,
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    if buf.len() < n {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PLY body"));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn array<const N: usize>(buf: &mut &[u8]) -> io::Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(buf, N)?);
    Ok(out)
}

#[cold]
fn bad(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

/// Splits off the header and returns it with the byte offset of the body.
fn parse_header(bytes: &[u8]) -> io::Result<(Header, usize)> {
    let mut offset = 0usize;
    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();
    let mut first = true;

    loop {
        let rest = &bytes[offset..];
        let nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| bad("PLY header is not terminated by end_header"))?;
        let line = std::str::from_utf8(&rest[..nl])
            .map_err(|_| bad("PLY header is not valid UTF-8"))?
            .trim_end_matches('\r')
            .trim();
        offset += nl + 1;

        if first {
            if line != "ply" {
                return Err(bad("bad PLY magic"));
            }
            first = false;
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            Some("format") => {
                format = Some(match words.next() {
                    Some("ascii") => Format::Ascii,
                    Some("binary_little_endian") => Format::BinaryLittleEndian,
                    Some(other) => return Err(bad(format!("unsupported PLY format '{other}'"))),
                    None => return Err(bad("missing PLY format")),
                });
            }
            Some("element") => {
                let name = words.next().ok_or_else(|| bad("element without name"))?;
                let count = words
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| bad("element without a valid count"))?;
                elements.push(Element {
                    name: name.to_owned(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| bad("property declared before any element"))?;
                let ty = words.next().ok_or_else(|| bad("property without type"))?;
                let property = if ty == "list" {
                    let count_ty = words.next().and_then(ScalarType::parse);
                    let item_ty = words.next().and_then(ScalarType::parse);
                    match (count_ty, item_ty) {
                        (Some(count_ty), Some(item_ty)) => Property::List { count_ty, item_ty },
                        _ => return Err(bad("list property with unknown types")),
                    }
                } else {
                    let ty = ScalarType::parse(ty)
                        .ok_or_else(|| bad(format!("unknown property type '{ty}'")))?;
                    let name = words.next().ok_or_else(|| bad("property without name"))?;
                    Property::Scalar {
                        name: name.to_owned(),
                        ty,
                    }
                };
                element.properties.push(property);
            }
            Some("end_header") => break,
            // comment, obj_info and blank lines
            _ => {}
        }
    }

    let format = format.ok_or_else(|| bad("missing PLY format line"))?;
    Ok((Header { format, elements }, offset))
}

enum ColorSource {
    Rgb { idx: [usize; 3], scale: f64 },
    ShDc { idx: [usize; 3] },
    Missing,
}

struct VertexLayout {
    xyz: [usize; 3],
    color: ColorSource,
}

impl VertexLayout {
    fn from_element(element: &Element) -> io::Result<Self> {
        let find = |wanted: &str| {
            element.properties.iter().position(|p| {
                matches!(p, Property::Scalar { name, .. } if name == wanted)
            })
        };
        let scalar_ty = |i: usize| match &element.properties[i] {
            Property::Scalar { ty, .. } => *ty,
            Property::List { item_ty, .. } => *item_ty,
        };

        let xyz = match (find("x"), find("y"), find("z")) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => return Err(bad("vertex element lacks x/y/z")),
        };

        let color = if let (Some(r), Some(g), Some(b)) = (find("red"), find("green"), find("blue")) {
            ColorSource::Rgb {
                idx: [r, g, b],
                scale: scalar_ty(r).color_scale(),
            }
        } else if let (Some(r), Some(g), Some(b)) = (find("f_dc_0"), find("f_dc_1"), find("f_dc_2")) {
            ColorSource::ShDc { idx: [r, g, b] }
        } else {
            ColorSource::Missing
        };

        Ok(Self { xyz, color })
    }
}

/// Source of one element row, as f64 scalars (lists are consumed and recorded as NaN).
trait RowReader {
    fn read_row(&mut self, element: &Element, out: &mut Vec<f64>) -> io::Result<()>;

    /// Upper bound on the rows of `element` the remaining input can hold.
    /// Header counts are untrusted; allocations are sized by this instead.
    fn max_rows(&self, element: &Element) -> usize;
}

struct BinaryRows<'a> {
    body: &'a [u8],
}

impl RowReader for BinaryRows<'_> {
    fn read_row(&mut self, element: &Element, out: &mut Vec<f64>) -> io::Result<()> {
        out.clear();
        for property in &element.properties {
            match property {
                Property::Scalar { ty, .. } => out.push(ty.read_le(&mut self.body)?),
                Property::List { count_ty, item_ty } => {
                    let n = count_ty.read_le(&mut self.body)?;
                    if n < 0.0 {
                        return Err(bad("negative list length"));
                    }
                    let len = (n as usize)
                        .checked_mul(item_ty.size())
                        .ok_or_else(|| bad("list length overflows"))?;
                    take(&mut self.body, len)?;
                    out.push(f64::NAN);
                }
            }
        }
        Ok(())
    }

    fn max_rows(&self, element: &Element) -> usize {
        let min_row: usize = element
            .properties
            .iter()
            .map(|p| match p {
                Property::Scalar { ty, .. } => ty.size(),
                Property::List { count_ty, .. } => count_ty.size(),
            })
            .sum();
        self.body.len() / min_row.max(1)
    }
}

struct AsciiRows<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
    /// Body length in bytes; every value takes at least one of them.
    len: usize,
}

impl AsciiRows<'_> {
    fn next_number(&mut self) -> io::Result<f64> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "truncated PLY body"))?;
        token
            .parse::<f64>()
            .map_err(|_| bad(format!("invalid number '{token}' in PLY body")))
    }
}

impl RowReader for AsciiRows<'_> {
    fn read_row(&mut self, element: &Element, out: &mut Vec<f64>) -> io::Result<()> {
        out.clear();
        for property in &element.properties {
            match property {
                Property::Scalar { .. } => out.push(self.next_number()?),
                Property::List { .. } => {
                    let n = self.next_number()?;
                    for _ in 0..n as usize {
                        self.next_number()?;
                    }
                    out.push(f64::NAN);
                }
            }
        }
        Ok(())
    }

    fn max_rows(&self, element: &Element) -> usize {
        self.len / element.properties.len().max(1)
    }
}

fn decode_vertices(header: &Header, rows: &mut dyn RowReader) -> io::Result<Vec<VertexRecord>> {
    let mut row = Vec::new();

    for element in &header.elements {
        if element.name != "vertex" {
            // Rows without properties occupy no bytes.
            if element.properties.is_empty() {
                continue;
            }
            for _ in 0..element.count {
                rows.read_row(element, &mut row)?;
            }
            continue;
        }

        let layout = VertexLayout::from_element(element)?;
        let mut records = Vec::with_capacity(element.count.min(rows.max_rows(element)));
        // f_dc terms are unbounded; track their range for the normalisation pass.
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);

        for _ in 0..element.count {
            rows.read_row(element, &mut row)?;
            let position = layout.xyz.map(|i| row[i] as f32);
            let color = match &layout.color {
                ColorSource::Rgb { idx, scale } => idx.map(|i| (row[i] / scale).clamp(0.0, 1.0) as f32),
                ColorSource::ShDc { idx } => idx.map(|i| {
                    lo = lo.min(row[i]);
                    hi = hi.max(row[i]);
                    row[i] as f32
                }),
                ColorSource::Missing => DEFAULT_COLOR,
            };
            records.push(VertexRecord::new(position, color));
        }

        if matches!(layout.color, ColorSource::ShDc { .. }) && (lo < 0.0 || hi > 1.0) {
            normalize_colors(&mut records, lo as f32, hi as f32);
        }
        return Ok(records);
    }

    Err(bad("PLY has no vertex element"))
}

/// Maps every colour channel from [lo, hi] onto [0, 1] with one shared range.
fn normalize_colors(records: &mut [VertexRecord], lo: f32, hi: f32) {
    let span = hi - lo;
    for r in records.iter_mut() {
        r.color = if span > f32::EPSILON {
            r.color.map(|c| ((c - lo) / span).clamp(0.0, 1.0))
        } else {
            DEFAULT_COLOR
        };
    }
}

/// Parse a PLY scan from a contiguous byte slice.
pub fn parse_ply_bytes(bytes: &[u8]) -> io::Result<Vec<VertexRecord>> {
    let (header, body_offset) = parse_header(bytes)?;
    let body = &bytes[body_offset..];

    match header.format {
        Format::BinaryLittleEndian => decode_vertices(&header, &mut BinaryRows { body }),
        Format::Ascii => {
            let text = std::str::from_utf8(body).map_err(|_| bad("ASCII PLY body is not UTF-8"))?;
            decode_vertices(
                &header,
                &mut AsciiRows {
                    tokens: text.split_ascii_whitespace(),
                    len: text.len(),
                },
            )
        }
    }
}

pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<VertexRecord>> {
    let bytes = fs::read(path)?;
    parse_ply_bytes(&bytes)
}

/// Encode records as binary little-endian PLY with float xyz and uchar rgb.
pub fn write_binary_ply(records: &[VertexRecord]) -> Vec<u8> {
    let header = format!(
        "ply\nformat binary_little_endian 1.0\ncomment written by scanply\n\
         element vertex {}\n\
         property float x\nproperty float y\nproperty float z\n\
         property uchar red\nproperty uchar green\nproperty uchar blue\n\
         end_header\n",
        records.len()
    );

    let mut out = Vec::with_capacity(header.len() + records.len() * 15);
    out.extend_from_slice(header.as_bytes());
    for r in records {
        for p in r.position {
            out.extend_from_slice(&p.to_le_bytes());
        }
        for c in r.color {
            out.push((c.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    out
}

pub fn write_file<P: AsRef<Path>>(path: P, records: &[VertexRecord]) -> io::Result<()> {
    fs::write(path, write_binary_ply(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_record_is_24_bytes() {
        assert_eq!(VertexRecord::SIZE, 24);
    }

    #[test]
    fn ascii_with_uchar_colors_and_faces() {
        let src = "ply\r\nformat ascii 1.0\r\ncomment scanner v2\r\n\
                   element vertex 2\r\n\
                   property float x\r\nproperty float y\r\nproperty float z\r\n\
                   property uchar red\r\nproperty uchar green\r\nproperty uchar blue\r\n\
                   element face 1\r\nproperty list uchar int vertex_indices\r\n\
                   end_header\r\n\
                   0.1 0.2 0.3 255 0 51\r\n\
                   -1 2.5 0 0 255 0\r\n\
                   3 0 1 1\r\n";

        let records = parse_ply_bytes(src.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].position, [0.1, 0.2, 0.3]);
        assert_eq!(records[0].color, [1.0, 0.0, 0.2]);
        assert_eq!(records[1].position, [-1.0, 2.5, 0.0]);
        assert_eq!(records[1].color, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn binary_with_sh_dc_colors_is_normalised() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\n\
                          element vertex 2\n\
                          property float x\nproperty float y\nproperty float z\n\
                          property float nx\n\
                          property float f_dc_0\nproperty float f_dc_1\nproperty float f_dc_2\n\
                          end_header\n"
            .to_vec();
        for row in [[1.0f32, 2.0, 3.0, 0.0, -1.0, 0.0, 1.0], [4.0, 5.0, 6.0, 0.0, 3.0, 1.0, -1.0]] {
            for v in row {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }

        let records = parse_ply_bytes(&bytes).unwrap();
        assert_eq!(records[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(records[0].color, [0.0, 0.25, 0.5]);
        assert_eq!(records[1].color, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn missing_colors_fall_back_to_grey() {
        let src = "ply\nformat ascii 1.0\nelement vertex 1\n\
                   property double x\nproperty double y\nproperty double z\nend_header\n1 2 3\n";
        let records = parse_ply_bytes(src.as_bytes()).unwrap();
        assert_eq!(records[0].color, DEFAULT_COLOR);
    }

    #[test]
    fn rejects_missing_coordinates_and_truncation() {
        let no_z = "ply\nformat ascii 1.0\nelement vertex 1\n\
                    property float x\nproperty float y\nend_header\n1 2\n";
        assert_eq!(
            parse_ply_bytes(no_z.as_bytes()).unwrap_err().kind(),
            ErrorKind::InvalidData
        );

        let mut truncated = write_binary_ply(&[VertexRecord::new([1.0; 3], [0.5; 3])]);
        truncated.truncate(truncated.len() - 2);
        assert_eq!(
            parse_ply_bytes(&truncated).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );

        assert!(parse_ply_bytes(b"obj\n").is_err());
        assert!(parse_ply_bytes(b"ply\nformat binary_big_endian 1.0\nend_header\n").is_err());
    }

    #[test]
    fn absurd_vertex_counts_fail_without_allocating() {
        for count in ["1000000000000000000", "100000000000"] {
            let ascii = format!(
                "ply\nformat ascii 1.0\nelement vertex {count}\n\
                 property float x\nproperty float y\nproperty float z\nend_header\n1 2 3\n"
            );
            assert_eq!(
                parse_ply_bytes(ascii.as_bytes()).unwrap_err().kind(),
                ErrorKind::UnexpectedEof
            );

            let mut binary = format!(
                "ply\nformat binary_little_endian 1.0\nelement vertex {count}\n\
                 property float x\nproperty float y\nproperty float z\nend_header\n"
            )
            .into_bytes();
            binary.extend_from_slice(&[0u8; 12]);
            assert_eq!(
                parse_ply_bytes(&binary).unwrap_err().kind(),
                ErrorKind::UnexpectedEof
            );
        }
    }

    #[test]
    fn empty_elements_with_huge_counts_are_skipped() {
        let src = "ply\nformat ascii 1.0\nelement marker 1000000000000000000\n\
                   element vertex 1\n\
                   property float x\nproperty float y\nproperty float z\nend_header\n1 2 3\n";
        assert_eq!(parse_ply_bytes(src.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn oversized_binary_list_is_rejected() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\n\
                          element face 1\nproperty list uint double vertex_indices\n\
                          element vertex 1\n\
                          property float x\nproperty float y\nproperty float z\n\
                          end_header\n"
            .to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        assert!(parse_ply_bytes(&bytes).is_err());
    }

    #[test]
    fn written_file_reads_back() {
        let records = vec![
            VertexRecord::new([0.0, -0.125, 0.25], [1.0, 0.0, 0.0]),
            VertexRecord::new([0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
        ];
        let back = parse_ply_bytes(&write_binary_ply(&records)).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn bounds_cover_all_points() {
        assert!(bounds(&[]).is_none());
        let b = bounds(&[
            VertexRecord::new([-1.0, 0.0, 2.0], [0.0; 3]),
            VertexRecord::new([1.0, 4.0, -2.0], [0.0; 3]),
        ])
        .unwrap();
        assert_eq!(b.min, [-1.0, 0.0, -2.0]);
        assert_eq!(b.max, [1.0, 4.0, 2.0]);
        assert_eq!(b.center(), [0.0, 2.0, 0.0]);
        assert_eq!(b.radius(), 3.0);
    }
}
