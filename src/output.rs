//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize record identifier (cyan)
pub fn colorize_id(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize window tag (yellow)
pub fn colorize_tag(text: &str, use_color: bool) -> String {
    if use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a distance value (bold, 6 decimals)
pub fn colorize_distance(distance: f32, use_color: bool) -> String {
    let text = format!("{:.6}", distance);
    if use_color {
        text.bold().to_string()
    } else {
        text
    }
}

/// Colorize an error line (red)
pub fn colorize_error(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

/// Dim secondary text such as metadata
pub fn colorize_dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Human-readable window tag: `whole`, `@<start>` or `too-short`.
pub fn window_label(origin_tag: Option<i64>) -> String {
    match origin_tag {
        None => "whole".to_string(),
        Some(tag) if tag < 0 => "too-short".to_string(),
        Some(start) => format!("@{}", start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_without_color() {
        assert_eq!(colorize_id("URS1", false), "URS1");
        assert_eq!(colorize_distance(1.0 / 3.0, false), "0.333333");
    }

    #[test]
    fn window_labels() {
        assert_eq!(window_label(None), "whole");
        assert_eq!(window_label(Some(-1)), "too-short");
        assert_eq!(window_label(Some(12)), "@12");
    }
}
