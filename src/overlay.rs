//! Detection overlay geometry.
//!
//! Maps a detection's source-frame pixel bounding box onto the current
//! display viewport. Pure transform: identical inputs always produce
//! identical output, and nothing here holds state.

use serde::Serialize;

use crate::classify::Detection;

/// Display viewport dimensions in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Source frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// A rectangle scaled into viewport space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OverlayRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Where the category label should be drawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LabelAnchor {
    pub x: f32,
    pub y: f32,
}

/// Scaled box plus label anchor for one detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub rect: OverlayRect,
    pub label: LabelAnchor,
}

/// Label height reserved above the box; anchors flip below the top edge
/// when the box touches the top of the viewport.
const LABEL_CLEARANCE: f32 = 18.0;

/// Scale `detection`'s bounding box from `frame` pixel space into
/// `viewport` space and place the label anchor.
///
/// The anchor sits just above the box's top-left corner, or just inside it
/// when the box is flush with the viewport top. Degenerate inputs (zero
/// frame or viewport) collapse to an empty rect at the origin.
pub fn render_overlay(detection: &Detection, frame: FrameSize, viewport: Viewport) -> Overlay {
    if frame.width == 0 || frame.height == 0 || viewport.width <= 0.0 || viewport.height <= 0.0 {
        return Overlay {
            rect: OverlayRect::default(),
            label: LabelAnchor { x: 0.0, y: 0.0 },
        };
    }

    let scale_x = viewport.width / frame.width as f32;
    let scale_y = viewport.height / frame.height as f32;

    let bb = detection.bounding_box;
    let rect = OverlayRect {
        x: bb.x as f32 * scale_x,
        y: bb.y as f32 * scale_y,
        w: bb.w as f32 * scale_x,
        h: bb.h as f32 * scale_y,
    };

    let label_y = if rect.y >= LABEL_CLEARANCE {
        rect.y - LABEL_CLEARANCE
    } else {
        rect.y + 2.0
    };
    let label = LabelAnchor {
        x: rect.x.clamp(0.0, viewport.width),
        y: label_y.clamp(0.0, viewport.height),
    };

    Overlay { rect, label }
}
