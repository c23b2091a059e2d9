//! Decoded frames.
//!
//! A `Frame` is an owned RGB24 pixel buffer plus dimensions and a per-source
//! sequence number. Frames are `Clone` because the latest-frame handoff works
//! by copy-out: a consumer must never hold a reference into the slot a worker
//! keeps overwriting.
//!
//! `compose_grid` is a presentation helper that tiles several frames into one
//! mosaic; it lives here because it only needs pixel math, no capture state.

/// One decoded video frame, tightly packed RGB24.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Pixel data, `width * height * 3` bytes, row-major, no stride padding.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Per-source capture sequence number, starting at 1.
    pub seq: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Self {
        Self {
            data,
            width,
            height,
            seq,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

// ----------------------------------------------------------------------------
// Grid composition
// ----------------------------------------------------------------------------

/// Tile frames into a `cols`-wide mosaic of `cell_width` x `cell_height`
/// cells. Frames are resized with nearest-neighbor sampling; trailing cells
/// in the last row are left black. Returns `None` when there is nothing to
/// compose or a dimension is zero.
pub fn compose_grid(
    frames: &[Frame],
    cols: usize,
    cell_width: u32,
    cell_height: u32,
) -> Option<Frame> {
    if frames.is_empty() || cols == 0 || cell_width == 0 || cell_height == 0 {
        return None;
    }

    let rows = (frames.len() + cols - 1) / cols;
    let grid_width = cell_width as usize * cols;
    let grid_height = cell_height as usize * rows;
    let mut data = vec![0u8; grid_width * grid_height * 3];

    for (slot, frame) in frames.iter().enumerate() {
        let cell = resize_nearest(frame, cell_width, cell_height);
        let origin_x = (slot % cols) * cell_width as usize;
        let origin_y = (slot / cols) * cell_height as usize;
        for row in 0..cell_height as usize {
            let src_start = row * cell_width as usize * 3;
            let src_end = src_start + cell_width as usize * 3;
            let dst_start = ((origin_y + row) * grid_width + origin_x) * 3;
            data[dst_start..dst_start + cell_width as usize * 3]
                .copy_from_slice(&cell[src_start..src_end]);
        }
    }

    Some(Frame::new(data, grid_width as u32, grid_height as u32, 0))
}

fn resize_nearest(frame: &Frame, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0u8; width as usize * height as usize * 3];
    if frame.width == 0 || frame.height == 0 {
        return out;
    }
    for y in 0..height as usize {
        let src_y = y * frame.height as usize / height as usize;
        for x in 0..width as usize {
            let src_x = x * frame.width as usize / width as usize;
            let src = (src_y * frame.width as usize + src_x) * 3;
            let dst = (y * width as usize + x) * 3;
            out[dst..dst + 3].copy_from_slice(&frame.data[src..src + 3]);
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(value: u8, width: u32, height: u32) -> Frame {
        Frame::new(
            vec![value; width as usize * height as usize * 3],
            width,
            height,
            1,
        )
    }

    #[test]
    fn grid_dimensions_cover_all_cells() {
        let frames = vec![
            solid_frame(10, 4, 4),
            solid_frame(20, 8, 8),
            solid_frame(30, 2, 6),
        ];
        let grid = compose_grid(&frames, 2, 4, 4).unwrap();
        // 3 frames in 2 columns -> 2 rows.
        assert_eq!(grid.width, 8);
        assert_eq!(grid.height, 8);
        assert_eq!(grid.data.len(), 8 * 8 * 3);
    }

    #[test]
    fn unused_cells_stay_black() {
        let frames = vec![solid_frame(255, 4, 4)];
        let grid = compose_grid(&frames, 2, 4, 4).unwrap();
        // First cell is white, second cell is padding.
        assert_eq!(grid.data[0], 255);
        let second_cell_start = 4 * 3;
        assert_eq!(grid.data[second_cell_start], 0);
    }

    #[test]
    fn empty_input_composes_nothing() {
        assert!(compose_grid(&[], 2, 4, 4).is_none());
        assert!(compose_grid(&[solid_frame(1, 4, 4)], 0, 4, 4).is_none());
    }

    #[test]
    fn resize_preserves_solid_color() {
        let frame = solid_frame(7, 10, 10);
        let resized = resize_nearest(&frame, 3, 3);
        assert!(resized.iter().all(|&b| b == 7));
    }
}
