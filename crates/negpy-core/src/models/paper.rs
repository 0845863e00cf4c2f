//! Built-in photographic paper substrates.
//!
//! A profile is just a base tint and a D-max gamma; selecting one copies the
//! values into the toning record, so presets stay self-contained.

/// Paper base simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperProfile {
    pub name: &'static str,
    pub tint: [f32; 3],
    pub dmax_gamma: f32,
}

pub const PAPER_PROFILES: &[PaperProfile] = &[
    PaperProfile {
        name: "None",
        tint: [1.0, 1.0, 1.0],
        dmax_gamma: 1.0,
    },
    PaperProfile {
        name: "Neutral RC",
        tint: [0.99, 0.99, 0.99],
        dmax_gamma: 1.0,
    },
    PaperProfile {
        name: "Cool Glossy",
        tint: [0.98, 0.99, 1.02],
        dmax_gamma: 1.1,
    },
    PaperProfile {
        name: "Warm Fiber",
        tint: [1.0, 0.97, 0.92],
        dmax_gamma: 1.15,
    },
    PaperProfile {
        name: "Antique Ivory",
        tint: [0.98, 0.94, 0.88],
        dmax_gamma: 1.05,
    },
];

/// Look up a profile by name; unknown names fall back to "None".
pub fn paper_profile(name: &str) -> &'static PaperProfile {
    PAPER_PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .unwrap_or(&PAPER_PROFILES[0])
}
