//! Thresholding for candidate extraction and marker decoding.

use squaremark_core::GrayImageView;

/// Binary image, one byte per pixel (0 or 1).
#[derive(Clone, Debug)]
pub(crate) struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl BinaryMask {
    #[inline]
    pub fn is_set(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.data[y as usize * self.width + x as usize] != 0
    }
}

/// Summed-area table with a zero row and column in front.
pub(crate) struct IntegralImage {
    width: usize,
    height: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImageView<'_>) -> Self {
        let (w, h) = (img.width, img.height);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += img.data[y * w + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    /// Mean over the window of radius `r` around `(x, y)`, clipped to the image.
    #[inline]
    pub fn box_mean(&self, x: usize, y: usize, r: usize) -> f32 {
        let x0 = x.saturating_sub(r);
        let y0 = y.saturating_sub(r);
        let x1 = (x + r + 1).min(self.width);
        let y1 = (y + r + 1).min(self.height);
        let stride = self.width + 1;
        let s = self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0];
        let n = ((x1 - x0) * (y1 - y0)) as f32;
        s as f32 / n
    }
}

/// Inverted mean-C adaptive threshold: a pixel is foreground (dark) when
/// `value <= local_mean - c` over a `window × window` box.
pub(crate) fn adaptive_threshold(
    img: &GrayImageView<'_>,
    integral: &IntegralImage,
    window: usize,
    c: f32,
) -> BinaryMask {
    let r = (window.max(3) | 1) / 2;
    let mut data = vec![0u8; img.width * img.height];
    for y in 0..img.height {
        for x in 0..img.width {
            let v = img.data[y * img.width + x] as f32;
            if v <= integral.box_mean(x, y, r) - c {
                data[y * img.width + x] = 1;
            }
        }
    }
    BinaryMask {
        width: img.width,
        height: img.height,
        data,
    }
}

/// Window sizes `min, min + step, ...` up to `max`, all forced odd.
pub(crate) fn threshold_windows(min: usize, max: usize, step: usize) -> Vec<usize> {
    let min = min.max(3);
    if step == 0 || max <= min {
        return vec![min | 1];
    }
    (min..=max).step_by(step).map(|w| w | 1).collect()
}

/// Otsu threshold of a set of sample intensities.
pub(crate) fn otsu_threshold(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut hist = [0u32; 256];
    let (mut min_v, mut max_v) = (u8::MAX, u8::MIN);
    for &v in samples {
        hist[v as usize] += 1;
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Mean and standard deviation of the samples.
pub(crate) fn mean_std(samples: &[u8]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use squaremark_core::GrayImage;

    #[test]
    fn integral_mean_matches_direct_average() {
        let mut img = GrayImage::filled(5, 4, 0);
        for y in 0..4 {
            for x in 0..5 {
                img.set(x, y, (x * 10 + y) as u8);
            }
        }
        let integral = IntegralImage::new(&img.view());
        // full 3x3 window around (2,1)
        let direct: f32 = (0..3)
            .flat_map(|y| (1..4).map(move |x| (x * 10 + y) as f32))
            .sum::<f32>()
            / 9.0;
        assert!((integral.box_mean(2, 1, 1) - direct).abs() < 1e-4);
        // clipped at the corner: 2x2 pixels
        assert!((integral.box_mean(0, 0, 1) - (0.0 + 10.0 + 1.0 + 11.0) / 4.0).abs() < 1e-4);
    }

    #[test]
    fn adaptive_threshold_marks_dark_square_on_light_background() {
        let mut img = GrayImage::filled(30, 30, 220);
        for y in 10..20 {
            for x in 10..20 {
                img.set(x, y, 20);
            }
        }
        let view = img.view();
        let integral = IntegralImage::new(&view);
        let mask = adaptive_threshold(&view, &integral, 13, 7.0);
        assert!(mask.is_set(10, 10));
        assert!(mask.is_set(19, 15));
        assert!(!mask.is_set(5, 5));
        assert!(!mask.is_set(25, 15));
        assert!(!mask.is_set(-1, 0));
    }

    #[test]
    fn threshold_windows_are_odd() {
        assert_eq!(threshold_windows(3, 23, 10), vec![3, 13, 23]);
        assert_eq!(threshold_windows(4, 4, 10), vec![5]);
    }

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut s = vec![20u8; 50];
        s.extend(std::iter::repeat(200u8).take(50));
        s.push(100);
        let t = otsu_threshold(&s);
        assert!((20..200).contains(&t));
        assert_eq!(otsu_threshold(&[9, 9, 9]), 9);
    }
}
