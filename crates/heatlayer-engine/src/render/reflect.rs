//! Minimal WGSL interface reflection.
//!
//! Extracts what the program builder needs to resolve names:
//! - `@vertex` / `@fragment` entry points
//! - vertex inputs (`@location(n) name`) of the vertex entry point
//! - `@group/@binding` resources, with the member layout of uniform blocks
//!
//! Only the declaration forms used by the layer's shaders are understood; anything
//! else is skipped and resolves to "absent". A uniform block whose layout
//! cannot be computed is not skipped: it is recorded in [`ShaderInterface::errors`].

use std::collections::HashMap;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Stage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntryPoint {
    pub stage: Stage,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VertexInput {
    pub name: String,
    pub location: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldLayout {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResourceType {
    /// `var<uniform>`; `fields` is empty for a non-struct block.
    Uniform { fields: Vec<FieldLayout>, size: u64 },
    Texture2d,
    Sampler,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResourceDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub ty: ResourceType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ShaderInterface {
    pub entry_points: Vec<EntryPoint>,
    pub vertex_inputs: Vec<VertexInput>,
    pub resources: Vec<ResourceDecl>,
    /// Uniform blocks whose layout could not be computed.
    pub errors: Vec<String>,
}

impl ShaderInterface {
    pub fn entry_point(&self, stage: Stage) -> Option<&str> {
        self.entry_points
            .iter()
            .find(|e| e.stage == stage)
            .map(|e| e.name.as_str())
    }

    pub fn vertex_input(&self, name: &str) -> Option<u32> {
        self.vertex_inputs
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.location)
    }
}

pub(crate) fn reflect(source: &str) -> ShaderInterface {
    let src = strip_comments(source);
    let structs = parse_structs(&src);

    let mut iface = ShaderInterface::default();

    for (attr, stage) in [("@vertex", Stage::Vertex), ("@fragment", Stage::Fragment)] {
        for (pos, _) in src.match_indices(attr) {
            let Some((name, args)) = parse_fn_header(&src[pos + attr.len()..]) else { continue };
            if stage == Stage::Vertex {
                iface.vertex_inputs.extend(vertex_inputs(&args, &structs));
            }
            iface.entry_points.push(EntryPoint { stage, name });
        }
    }

    (iface.resources, iface.errors) = parse_resources(&src, &structs);
    iface
}

// ── declarations ──────────────────────────────────────────────────────────

/// `@attr(arg) @attr name: type`, as found in struct members and fn arguments.
#[derive(Debug, Clone, PartialEq)]
struct Decl {
    attrs: Vec<(String, Option<String>)>,
    name: String,
    ty: String,
}

impl Decl {
    fn attr_u32(&self, name: &str) -> Option<u32> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, arg)| arg.as_deref())
            .and_then(|arg| arg.trim().parse().ok())
    }
}

fn parse_decl(text: &str) -> Option<Decl> {
    let mut rest = text.trim();
    let mut attrs = Vec::new();

    while let Some(after_at) = rest.strip_prefix('@') {
        let name_len = after_at
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after_at.len());
        let name = after_at[..name_len].to_string();
        let mut tail = after_at[name_len..].trim_start();

        let mut arg = None;
        if tail.starts_with('(') {
            let close = matching(tail, 0, '(', ')')?;
            arg = Some(tail[1..close].to_string());
            tail = &tail[close + 1..];
        }

        attrs.push((name, arg));
        rest = tail.trim_start();
    }

    let (name, ty) = rest.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    Some(Decl {
        attrs,
        name: name.to_string(),
        ty: ty.trim().to_string(),
    })
}

fn parse_structs(src: &str) -> HashMap<String, Vec<Decl>> {
    let mut out = HashMap::new();

    for pos in word_positions(src, "struct") {
        let after = &src[pos + "struct".len()..];
        let Some(open) = after.find('{') else { continue };
        let Some(close) = matching(after, open, '{', '}') else { continue };

        let name = after[..open].trim().to_string();
        let members = split_top_level(&after[open + 1..close], ',')
            .into_iter()
            .filter_map(parse_decl)
            .collect();
        out.insert(name, members);
    }

    out
}

/// Parses `fn name(args)` following a stage attribute.
fn parse_fn_header(text: &str) -> Option<(String, Vec<Decl>)> {
    let rest = text.trim_start().strip_prefix("fn")?;
    let open = rest.find('(')?;
    let close = matching(rest, open, '(', ')')?;

    let name = rest[..open].trim().to_string();
    let args = split_top_level(&rest[open + 1..close], ',')
        .into_iter()
        .filter_map(parse_decl)
        .collect();
    Some((name, args))
}

fn vertex_inputs(args: &[Decl], structs: &HashMap<String, Vec<Decl>>) -> Vec<VertexInput> {
    let mut out = Vec::new();
    for arg in args {
        if let Some(location) = arg.attr_u32("location") {
            out.push(VertexInput { name: arg.name.clone(), location });
        } else if let Some(members) = structs.get(&arg.ty) {
            out.extend(members.iter().filter_map(|m| {
                m.attr_u32("location").map(|location| VertexInput {
                    name: m.name.clone(),
                    location,
                })
            }));
        }
    }
    out
}

fn parse_resources(
    src: &str,
    structs: &HashMap<String, Vec<Decl>>,
) -> (Vec<ResourceDecl>, Vec<String>) {
    let mut out = Vec::new();
    let mut errors = Vec::new();

    for pos in word_positions(src, "var") {
        let prefix_start = src[..pos].rfind([';', '}', '{']).map_or(0, |p| p + 1);
        let prefix = &src[prefix_start..pos];

        let attrs = format!("{prefix} _: _");
        let Some(attrs) = parse_decl(&attrs) else { continue };
        let (Some(group), Some(binding)) = (attrs.attr_u32("group"), attrs.attr_u32("binding"))
        else {
            continue;
        };

        let mut rest = &src[pos + "var".len()..];
        let mut space = "";
        if rest.starts_with('<') {
            let Some(close) = matching(rest, 0, '<', '>') else { continue };
            space = rest[1..close].trim();
            rest = &rest[close + 1..];
        }
        let decl_end = rest.find(';').unwrap_or(rest.len());
        let Some(decl) = parse_decl(&rest[..decl_end]) else { continue };

        let ty = if space == "uniform" {
            let layout = match structs.get(&decl.ty) {
                Some(members) => struct_fields(members, structs),
                None => type_layout(&decl.ty, structs).map(|(_, size)| (Vec::new(), size)),
            };
            let Some((fields, size)) = layout else {
                errors.push(format!(
                    "uniform `{}` has a type without a known uniform layout: `{}`",
                    decl.name, decl.ty
                ));
                continue;
            };
            ResourceType::Uniform { fields, size }
        } else if decl.ty.starts_with("texture_2d") {
            ResourceType::Texture2d
        } else if decl.ty == "sampler" {
            ResourceType::Sampler
        } else {
            continue;
        };

        out.push(ResourceDecl {
            name: decl.name,
            group,
            binding,
            ty,
        });
    }

    (out, errors)
}

// ── uniform layout ────────────────────────────────────────────────────────

/// Member offsets/sizes and total size of a uniform struct.
fn struct_fields(
    members: &[Decl],
    structs: &HashMap<String, Vec<Decl>>,
) -> Option<(Vec<FieldLayout>, u64)> {
    let mut fields = Vec::with_capacity(members.len());
    let mut offset = 0u64;
    let mut align = 16u64;

    for m in members {
        let (a, size) = type_layout(&m.ty, structs)?;
        offset = round_up(offset, a);
        fields.push(FieldLayout {
            name: m.name.clone(),
            offset,
            size,
        });
        offset += size;
        align = align.max(a);
    }

    Some((fields, round_up(offset, align)))
}

/// `(align, size)` under WGSL uniform address space rules.
fn type_layout(ty: &str, structs: &HashMap<String, Vec<Decl>>) -> Option<(u64, u64)> {
    let ty: String = ty.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(members) = structs.get(&ty) {
        let (_, size) = struct_fields(members, structs)?;
        return Some((16, size));
    }
    if let Some(size) = scalar_size(&ty) {
        return Some((size, size));
    }

    if let Some(rest) = ty.strip_prefix("vec") {
        let (n, suffix) = dimension(rest)?;
        return Some(vector_layout(n, element_size(suffix)?));
    }

    // matCxR is C column vectors of R floats.
    if let Some(rest) = ty.strip_prefix("mat") {
        let (cols, rest) = dimension(rest)?;
        let (rows, suffix) = dimension(rest.strip_prefix('x')?)?;
        if !matches!(suffix, "f" | "<f32>") {
            return None;
        }
        let (align, column) = vector_layout(rows, 4);
        return Some((align, cols * round_up(column, align)));
    }

    if let Some(inner) = ty.strip_prefix("array<").and_then(|t| t.strip_suffix('>')) {
        let parts = split_top_level(inner, ',');
        let [elem, count] = parts.as_slice() else { return None };
        let count: u64 = count.trim().parse().ok()?;
        let (a, size) = type_layout(elem, structs)?;
        let stride = round_up(size, a);
        // Uniform arrays need a 16-byte stride.
        if stride % 16 != 0 {
            return None;
        }
        return Some((a.max(16), stride * count));
    }

    None
}

fn scalar_size(ty: &str) -> Option<u64> {
    matches!(ty, "f32" | "u32" | "i32").then_some(4)
}

/// Leading `2`..=`4` of a vector or matrix type, and what follows it.
fn dimension(text: &str) -> Option<(u64, &str)> {
    let n = match text.as_bytes().first()? {
        b'2' => 2,
        b'3' => 3,
        b'4' => 4,
        _ => return None,
    };
    Some((n, &text[1..]))
}

/// Component size from a `<T>` parameter or an `f`/`i`/`u` shorthand suffix.
fn element_size(suffix: &str) -> Option<u64> {
    match suffix {
        "f" | "i" | "u" => Some(4),
        _ => scalar_size(suffix.strip_prefix('<')?.strip_suffix('>')?),
    }
}

fn vector_layout(n: u64, component: u64) -> (u64, u64) {
    let align = if n == 2 { 2 * component } else { 4 * component };
    (align, n * component)
}

#[inline]
fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

// ── text helpers ──────────────────────────────────────────────────────────

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = rest[start + 2..].find("*/").map_or("", |end| &rest[start + 2 + end + 2..]);
    }
    out.push_str(rest);

    out.lines()
        .map(|line| line.split_once("//").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte positions of `word` not embedded in a longer identifier.
fn word_positions<'a>(src: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    src.match_indices(word).filter_map(move |(pos, _)| {
        let before_ok = src[..pos].chars().next_back().is_none_or(|c| !is_ident(c));
        let after_ok = src[pos + word.len()..].chars().next().is_none_or(|c| !is_ident(c));
        (before_ok && after_ok).then_some(pos)
    })
}

/// Index of the bracket closing the one at `open`.
fn matching(text: &str, open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        if c == open_ch {
            depth += 1;
        } else if c == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(open + i);
            }
        }
    }
    None
}

/// Splits on `sep` outside `<>`, `()` and `[]`; drops empty pieces.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                out.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&text[start..]);

    out.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
        struct Params {
            view_proj: mat4x4<f32>, // 0
            look_at: vec2<f32>,
            viewport: vec2<f32>,
            size: f32,
            density: f32,
        }

        @group(0) @binding(0) var<uniform> params: Params;

        struct VertexInput {
            @location(0) a_position: vec2<f32>,
            @location(3) a_intensity: f32,
        }

        struct VertexOutput {
            @builtin(position) clip: vec4<f32>,
            @location(0) v_intensity: f32,
        }

        @vertex
        fn vs_main(in: VertexInput, @builtin(vertex_index) vertex_index: u32) -> VertexOutput {
            var out: VertexOutput;
            out.clip = params.view_proj * vec4<f32>(in.a_position, 0.0, 1.0);
            return out;
        }
    "#;

    const FRAGMENT: &str = r#"
        struct Ramp {
            colors: array<vec4<f32>, 11>,
            offsets: array<vec4<f32>, 3>,
            stop_count: u32,
            opacity: f32,
        }

        @group(0) @binding(0) var<uniform> ramp: Ramp;
        @group(0) @binding(1) var u_gradient: texture_2d<f32>;
        @group(0) @binding(2) var u_sampler: sampler;

        /* @vertex fn commented_out() {} */
        @fragment
        fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
            return textureSample(u_gradient, u_sampler, uv);
        }
    "#;

    #[test]
    fn finds_entry_points_per_stage() {
        let v = reflect(VERTEX);
        assert_eq!(v.entry_point(Stage::Vertex), Some("vs_main"));
        assert_eq!(v.entry_point(Stage::Fragment), None);

        let f = reflect(FRAGMENT);
        assert_eq!(f.entry_point(Stage::Fragment), Some("fs_main"));
        assert_eq!(f.entry_point(Stage::Vertex), None);
    }

    #[test]
    fn resolves_vertex_inputs_through_struct_argument() {
        let v = reflect(VERTEX);
        assert_eq!(v.vertex_input("a_position"), Some(0));
        assert_eq!(v.vertex_input("a_intensity"), Some(3));
        assert_eq!(v.vertex_input("vertex_index"), None);
        assert_eq!(v.vertex_input("v_intensity"), None);
    }

    #[test]
    fn uniform_block_follows_wgsl_layout() {
        let v = reflect(VERTEX);
        let [res] = v.resources.as_slice() else { panic!("expected one resource") };
        assert_eq!((res.name.as_str(), res.group, res.binding), ("params", 0, 0));

        let ResourceType::Uniform { fields, size } = &res.ty else { panic!("not a uniform") };
        let offsets: Vec<_> = fields.iter().map(|f| (f.name.as_str(), f.offset, f.size)).collect();
        assert_eq!(
            offsets,
            vec![
                ("view_proj", 0, 64),
                ("look_at", 64, 8),
                ("viewport", 72, 8),
                ("size", 80, 4),
                ("density", 84, 4),
            ]
        );
        assert_eq!(*size, 96);
    }

    #[test]
    fn arrays_textures_and_samplers_are_reflected() {
        let f = reflect(FRAGMENT);
        assert_eq!(f.resources.len(), 3);

        let ResourceType::Uniform { fields, size } = &f.resources[0].ty else { panic!() };
        assert_eq!((fields[0].offset, fields[0].size), (0, 176));
        assert_eq!((fields[1].offset, fields[1].size), (176, 48));
        assert_eq!(fields[2].offset, 224);
        assert_eq!(fields[3].offset, 228);
        assert_eq!(*size, 240);

        assert_eq!(f.resources[1].ty, ResourceType::Texture2d);
        assert_eq!(f.resources[1].binding, 1);
        assert_eq!(f.resources[2].ty, ResourceType::Sampler);
    }

    #[test]
    fn function_local_vars_are_not_resources() {
        let v = reflect(VERTEX);
        assert!(v.resources.iter().all(|r| r.name != "out"));
    }

    #[test]
    fn f32_arrays_are_not_valid_uniform_layouts() {
        let src = r#"
            struct Bad { values: array<f32, 4>, }
            @group(0) @binding(0) var<uniform> bad: Bad;
        "#;
        let iface = reflect(src);
        assert!(iface.resources.is_empty());
        let [error] = iface.errors.as_slice() else { panic!("expected one error") };
        assert!(error.contains("`bad`"), "{error}");
    }

    #[test]
    fn matrices_and_shorthand_vectors_have_uniform_layouts() {
        let src = r#"
            struct P {
                rot: mat3x3<f32>,
                size: f32,
                cells: vec2i,
                tint: vec3f,
                skew: mat2x2f,
                flags: vec4<u32>,
            }
            @group(0) @binding(0) var<uniform> p: P;
        "#;
        let iface = reflect(src);
        assert!(iface.errors.is_empty(), "{:?}", iface.errors);

        let ResourceType::Uniform { fields, size } = &iface.resources[0].ty else { panic!() };
        let layout: Vec<_> = fields.iter().map(|f| (f.name.as_str(), f.offset, f.size)).collect();
        assert_eq!(
            layout,
            vec![
                ("rot", 0, 48),
                ("size", 48, 4),
                ("cells", 56, 8),
                ("tint", 64, 12),
                ("skew", 80, 16),
                ("flags", 96, 16),
            ]
        );
        assert_eq!(*size, 112);
    }

    #[test]
    fn unsupported_scalars_are_layout_errors() {
        for ty in ["bool", "vec3<bool>", "mat3x3<i32>", "vec5f", "f16"] {
            let src = format!("@group(0) @binding(0) var<uniform> u_value: {ty};");
            let iface = reflect(&src);
            assert!(iface.resources.is_empty(), "{ty}");
            assert_eq!(iface.errors.len(), 1, "{ty}");
        }
    }

    #[test]
    fn split_respects_nesting() {
        assert_eq!(
            split_top_level("a: array<vec4<f32>, 11>, b: f32,", ','),
            vec!["a: array<vec4<f32>, 11>", " b: f32"]
        );
    }
}
