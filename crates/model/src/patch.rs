use ndarray::{Array3, Array4, ArrayView4};

/// Slices a normalized image tensor into a grid of fixed-size,
/// non-overlapping patches.
///
/// The stride equals the patch size and no padding is applied, so trailing
/// rows and columns that do not fill a whole patch are silently dropped.
/// Within a patch, pixels are walked row-major and each pixel contributes
/// its channels in order; a patch flattens to `patch_h * patch_w * channels`
/// values. This ordering is part of the weight contract and must not change.
#[derive(Debug, Clone, Copy)]
pub struct PatchExtractor {
    patch_h: usize,
    patch_w: usize,
}

impl PatchExtractor {
    pub fn new(patch_h: usize, patch_w: usize) -> Self {
        Self { patch_h, patch_w }
    }

    /// Grid dimensions for an image of `height` x `width`.
    pub fn grid_shape(&self, height: usize, width: usize) -> (usize, usize) {
        (height / self.patch_h, width / self.patch_w)
    }

    /// Tile `images` of shape `(batch, height, width, channels)` into a
    /// `(batch, grid_h, grid_w, patch_dim)` grid.
    ///
    /// An image smaller than the patch yields an empty grid rather than an
    /// error; the fixed resize upstream is expected to prevent that.
    pub fn extract(&self, images: &ArrayView4<f32>) -> Array4<f32> {
        let (batch, height, width, channels) = images.dim();
        let (grid_h, grid_w) = self.grid_shape(height, width);
        let patch_dim = self.patch_h * self.patch_w * channels;

        let mut patches = Array4::<f32>::zeros((batch, grid_h, grid_w, patch_dim));
        for b in 0..batch {
            for gy in 0..grid_h {
                for gx in 0..grid_w {
                    let mut k = 0;
                    for py in 0..self.patch_h {
                        for px in 0..self.patch_w {
                            for c in 0..channels {
                                patches[[b, gy, gx, k]] = images[[
                                    b,
                                    gy * self.patch_h + py,
                                    gx * self.patch_w + px,
                                    c,
                                ]];
                                k += 1;
                            }
                        }
                    }
                }
            }
        }
        patches
    }

    /// Extract and flatten the grid row-major into `(batch, n, patch_dim)`.
    pub fn sequence(&self, images: &ArrayView4<f32>) -> Array3<f32> {
        let grid = self.extract(images);
        let (batch, grid_h, grid_w, patch_dim) = grid.dim();
        grid.into_shape_with_order((batch, grid_h * grid_w, patch_dim))
            .expect("freshly extracted grid is contiguous")
    }
}
