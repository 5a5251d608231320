// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use winit::dpi::LogicalSize;
use winit::window::WindowAttributes;

/// Fixed-size, non-resizable window with no client drawing API attached;
/// presentation is left entirely to the graphics driver.
pub fn fixed_window_attributes(title: &str, width: u32, height: u32) -> WindowAttributes {
    tracing::debug!("window attributes: {title:?} {width}x{height}, resizable=false");
    WindowAttributes::default()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width, height))
        .with_resizable(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_fixed_size() {
        let attrs = fixed_window_attributes("Triangle", 800, 600);
        assert_eq!(attrs.title, "Triangle");
        assert!(!attrs.resizable);
        assert_eq!(
            attrs.inner_size,
            Some(LogicalSize::new(800u32, 600u32).into())
        );
    }
}
