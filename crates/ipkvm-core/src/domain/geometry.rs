//! Letterbox geometry used to map preview-widget coordinates into the
//! absolute coordinate space of the target machine.
//!
//! The preview shows the captured frame scaled to fit the widget with its
//! aspect ratio preserved and centred, so the usable area (`display_rect`)
//! is usually smaller than the widget and offset from its origin. Pointer
//! positions outside that rectangle are clamped onto its edge.

use serde::{Deserialize, Serialize};

use super::command::ABSOLUTE_MAX;

/// Integer width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// `true` when either dimension is zero or negative.
    pub const fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Largest size with this aspect ratio that fits inside `bounds`.
    ///
    /// Uses 64-bit intermediates; the result is truncated towards zero.
    pub fn scaled_to_fit(self, bounds: Size) -> Size {
        if self.is_empty() || bounds.is_empty() {
            return Size::default();
        }
        let fit_width =
            i64::from(bounds.height) * i64::from(self.width) / i64::from(self.height);
        if fit_width <= i64::from(bounds.width) {
            Size::new(fit_width as i32, bounds.height)
        } else {
            let fit_height =
                i64::from(bounds.width) * i64::from(self.height) / i64::from(self.width);
            Size::new(bounds.width, fit_height as i32)
        }
    }
}

/// Integer point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `|dx| + |dy|` between two points.
    pub fn manhattan_distance(self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Axis-aligned rectangle with an inclusive origin and exclusive far edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Clamps `p` onto the last pixel row/column inside the rectangle.
    pub fn clamp_point(self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.x, self.x + self.width - 1),
            p.y.clamp(self.y, self.y + self.height - 1),
        )
    }
}

/// Maps a widget-space point into the `0..=4095` absolute range of `rect`.
///
/// Returns `None` when `rect` is empty, in which case the event is dropped.
pub fn map_to_absolute(rect: Rect, p: Point) -> Option<(i32, i32)> {
    if rect.is_empty() {
        return None;
    }
    let clipped = rect.clamp_point(p);
    let rel_x = i64::from(clipped.x - rect.x);
    let rel_y = i64::from(clipped.y - rect.y);
    let x = rel_x * i64::from(ABSOLUTE_MAX) / i64::from(rect.width);
    let y = rel_y * i64::from(ABSOLUTE_MAX) / i64::from(rect.height);
    Some((x as i32, y as i32))
}

// ── DisplayMapping ────────────────────────────────────────────────────────────

/// Source frame size, widget size, and the letterboxed rectangle between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayMapping {
    source: Size,
    widget: Size,
    display_rect: Rect,
}

impl DisplayMapping {
    /// Computes the letterbox for `source` shown inside `widget`.
    ///
    /// Returns `None` if either size is empty; callers keep their previous
    /// mapping in that case.
    pub fn compute(source: Size, widget: Size) -> Option<Self> {
        if source.is_empty() || widget.is_empty() {
            return None;
        }
        let scaled = source.scaled_to_fit(widget);
        let display_rect = Rect::new(
            (widget.width - scaled.width) / 2,
            (widget.height - scaled.height) / 2,
            scaled.width,
            scaled.height,
        );
        Some(Self {
            source,
            widget,
            display_rect,
        })
    }

    pub fn source(&self) -> Size {
        self.source
    }

    pub fn widget(&self) -> Size {
        self.widget
    }

    pub fn display_rect(&self) -> Rect {
        self.display_rect
    }

    /// See [`map_to_absolute`].
    pub fn map_absolute(&self, p: Point) -> Option<(i32, i32)> {
        map_to_absolute(self.display_rect, p)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_centres_wide_widget_horizontally() {
        // Arrange: 4:3 source in a 16:9-ish widget → pillarbox
        let source = Size::new(640, 480);
        let widget = Size::new(1000, 600);

        // Act
        let mapping = DisplayMapping::compute(source, widget).expect("non-empty sizes");

        // Assert: 600 * 640 / 480 = 800 wide, centred with 100px bars
        assert_eq!(mapping.display_rect(), Rect::new(100, 0, 800, 600));
    }

    #[test]
    fn test_letterbox_centres_tall_widget_vertically() {
        // Arrange
        let source = Size::new(1920, 1080);
        let widget = Size::new(800, 800);

        // Act
        let mapping = DisplayMapping::compute(source, widget).expect("non-empty sizes");

        // Assert: 800 * 1080 / 1920 = 450 high, (800 - 450) / 2 = 175 offset
        assert_eq!(mapping.display_rect(), Rect::new(0, 175, 800, 450));
    }

    #[test]
    fn test_compute_returns_none_for_empty_sizes() {
        assert!(DisplayMapping::compute(Size::new(0, 480), Size::new(800, 600)).is_none());
        assert!(DisplayMapping::compute(Size::new(640, 480), Size::new(800, 0)).is_none());
    }

    #[test]
    fn test_map_to_absolute_origin_corner_maps_to_zero() {
        // Arrange
        let rect = Rect::new(50, 50, 400, 300);

        // Act
        let origin = map_to_absolute(rect, Point::new(50, 50));
        let inside = map_to_absolute(rect, Point::new(100, 100));
        let clipped = map_to_absolute(rect, Point::new(10, 10));

        // Assert: 50 * 4095 / 400 = 511, 50 * 4095 / 300 = 682
        assert_eq!(origin, Some((0, 0)));
        assert_eq!(inside, Some((511, 682)));
        assert_eq!(clipped, Some((0, 0)), "points above/left clamp onto the origin");
    }

    #[test]
    fn test_map_to_absolute_far_corner_clamps_to_last_pixel() {
        // Arrange
        let rect = Rect::new(50, 50, 400, 300);

        // Act: (450, 350) lies just outside; clamps to (449, 349)
        let mapped = map_to_absolute(rect, Point::new(450, 350));

        // Assert: 399 * 4095 / 400 = 4084, 299 * 4095 / 300 = 4081
        assert_eq!(mapped, Some((4084, 4081)));
    }

    #[test]
    fn test_map_to_absolute_never_leaves_range_for_far_outside_points() {
        let rect = Rect::new(0, 0, 1, 1);
        for p in [Point::new(i32::MIN / 2, 0), Point::new(i32::MAX / 2, i32::MAX / 2)] {
            let (x, y) = map_to_absolute(rect, p).expect("rect is not empty");
            assert!((0..=ABSOLUTE_MAX).contains(&x));
            assert!((0..=ABSOLUTE_MAX).contains(&y));
        }
    }

    #[test]
    fn test_map_to_absolute_drops_event_for_empty_rect() {
        assert_eq!(map_to_absolute(Rect::new(10, 10, 0, 5), Point::new(10, 10)), None);
    }

    #[test]
    fn test_manhattan_distance_sums_axes() {
        assert_eq!(Point::new(1, 1).manhattan_distance(Point::new(4, -2)), 6);
    }
}
