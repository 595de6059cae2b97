use indexmap::IndexMap;

pub const DEFAULT_METHOD: &str = "kontext";

pub const ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "21:9", "9:21"];

const SAFETY_TOLERANCES: &[&str] = &["1", "2", "3", "4", "5", "6"];
const OUTPUT_FORMATS: &[&str] = &["jpeg", "png"];

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Float { default: f64, min: f64, max: f64 },
    Int { default: i64, min: i64, max: i64 },
    Choice { default: String, options: Vec<String> },
    Flag { default: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    pub label: String,
    pub requires_reference: bool,
    pub params: Vec<ParamSpec>,
}

impl MethodSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct MethodRegistry {
    methods: IndexMap<String, MethodSpec>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MethodRegistry {
    pub fn new(methods: Option<IndexMap<String, MethodSpec>>) -> Self {
        Self {
            methods: methods.unwrap_or_else(default_methods),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &MethodSpec> {
        self.methods.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn first(&self) -> Option<&MethodSpec> {
        self.methods.values().next()
    }

    /// Unknown methods are treated as text-to-image and never require a reference.
    pub fn requires_reference(&self, name: &str) -> bool {
        self.get(name)
            .map(|method| method.requires_reference)
            .unwrap_or(false)
    }
}

fn float(name: &str, default: f64, min: f64, max: f64) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: ParamKind::Float { default, min, max },
    }
}

fn int(name: &str, default: i64, min: i64, max: i64) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: ParamKind::Int { default, min, max },
    }
}

fn choice(name: &str, default: &str, options: &[&str]) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: ParamKind::Choice {
            default: default.to_string(),
            options: options.iter().map(|item| (*item).to_string()).collect(),
        },
    }
}

fn flag(name: &str, default: bool) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: ParamKind::Flag { default },
    }
}

fn default_methods() -> IndexMap<String, MethodSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, label: &str, requires_reference: bool, params: Vec<ParamSpec>| {
        map.insert(
            name.to_string(),
            MethodSpec {
                name: name.to_string(),
                label: label.to_string(),
                requires_reference,
                params,
            },
        );
    };

    insert("kontext", "FLUX Kontext [dev]", false, Vec::new());
    insert("flux-1", "FLUX.1", false, Vec::new());
    insert(
        "hidream-i1-full",
        "HiDream I1 Full",
        false,
        vec![
            float("hidream_guidance_scale", 5.0, 1.0, 20.0),
            int("hidream_inference_steps", 50, 1, 100),
            choice("hidream_output_format", "jpeg", OUTPUT_FORMATS),
            flag("hidream_safety_checker", true),
        ],
    );
    insert("kontext-edit", "Kontext Edit", true, Vec::new());
    insert("kontext-max", "Kontext Max", true, Vec::new());
    insert(
        "kontext-max-text-to-image",
        "Kontext Max Text-to-Image",
        false,
        vec![
            float("kontext_max_guidance_scale", 3.5, 1.0, 20.0),
            choice("kontext_max_safety_tolerance", "2", SAFETY_TOLERANCES),
            choice("kontext_max_output_format", "jpeg", OUTPUT_FORMATS),
            choice("kontext_max_aspect_ratio", "1:1", ASPECT_RATIOS),
            flag("kontext_max_sync_mode", false),
        ],
    );
    insert("seededit", "SeedEdit", true, Vec::new());
    insert("imagen4", "Imagen 4", false, Vec::new());
    insert("imagen4-preview", "Imagen 4 Preview", false, Vec::new());
    insert(
        "juggernaut-pro",
        "Juggernaut Pro",
        true,
        vec![
            float("strength", 0.95, 0.0, 1.0),
            float("guidance_scale", 3.5, 1.0, 20.0),
            int("num_inference_steps", 40, 1, 100),
        ],
    );
    insert(
        "clarity-upscaler",
        "Clarity Upscaler",
        true,
        vec![
            float("upscale_factor", 2.0, 1.0, 4.0),
            float("creativity", 0.35, 0.0, 1.0),
            float("resemblance", 0.6, 0.0, 1.0),
            float("guidance_scale", 4.0, 1.0, 20.0),
            int("num_inference_steps", 18, 1, 100),
        ],
    );
    insert(
        "scene-composition",
        "Scene Composition",
        true,
        vec![
            float("guidance_scale", 3.5, 1.0, 20.0),
            int("num_inference_steps", 30, 1, 100),
            choice("safety_tolerance", "2", SAFETY_TOLERANCES),
            choice("output_format", "jpeg", OUTPUT_FORMATS),
        ],
    );

    map
}
