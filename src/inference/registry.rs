//! Model registry
//!
//! The closed, ordered set of models the user can pick from. The first entry
//! is the default selection at startup.

/// A selectable model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Identifier passed to the inference capability
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
    /// Approximate download size, e.g. "~0.6GB"
    pub approximate_size: &'static str,
}

const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "Llama-3.2-1B-Instruct-q4f16_1-MLC",
        name: "Llama 3.2 1B",
        description: "Fastest, good for simple tasks",
        approximate_size: "~0.6GB",
    },
    ModelDescriptor {
        id: "Llama-3.2-3B-Instruct-q4f16_1-MLC",
        name: "Llama 3.2 3B",
        description: "Balanced performance and quality",
        approximate_size: "~1.9GB",
    },
    ModelDescriptor {
        id: "Phi-3.5-mini-instruct-q4f16_1-MLC",
        name: "Phi 3.5 Mini",
        description: "High quality, Microsoft's latest",
        approximate_size: "~2.3GB",
    },
    ModelDescriptor {
        id: "gemma-2-2b-it-q4f16_1-MLC",
        name: "Gemma 2 2B",
        description: "Google's efficient open model",
        approximate_size: "~1.6GB",
    },
    ModelDescriptor {
        id: "Qwen2-1.5B-Instruct-q4f16_1-MLC",
        name: "Qwen2 1.5B",
        description: "Strong reasoning capabilities",
        approximate_size: "~0.9GB",
    },
    ModelDescriptor {
        id: "Mistral-7B-Instruct-v0.3-q4f16_1-MLC",
        name: "Mistral 7B v0.3",
        description: "Powerful, larger model (requires more VRAM)",
        approximate_size: "~4.4GB",
    },
    ModelDescriptor {
        id: "Hermes-2-Pro-Llama-3-8B-q4f16_1-MLC",
        name: "Hermes 2 Pro",
        description: "Advanced instruction following",
        approximate_size: "~4.9GB",
    },
];

/// All selectable models, in display order
pub fn list_models() -> &'static [ModelDescriptor] {
    MODELS
}

/// The model selected at startup
pub fn default_model() -> &'static ModelDescriptor {
    &MODELS[0]
}

/// Looks up a model by identifier
pub fn find_model(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}
