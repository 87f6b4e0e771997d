//! Outer boundaries of 8-connected foreground components.

use crate::threshold::BinaryMask;

/// Neighbour offsets in on-screen clockwise order, starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

fn dir_index(dx: i32, dy: i32) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(WEST)
}

/// A traced boundary: pixel coordinates in on-screen clockwise order.
#[derive(Clone, Debug)]
pub(crate) struct Contour {
    pub points: Vec<(i32, i32)>,
}

struct Component {
    label: u32,
    start: (i32, i32),
    bbox: (i32, i32, i32, i32),
}

/// Label 8-connected components; labels start at 1, 0 is background.
fn label_components(mask: &BinaryMask) -> (Vec<u32>, Vec<Component>) {
    let (w, h) = (mask.width as i32, mask.height as i32);
    let mut labels = vec![0u32; mask.data.len()];
    let mut comps = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if mask.data[idx] == 0 || labels[idx] != 0 {
                continue;
            }
            let label = comps.len() as u32 + 1;
            let mut bbox = (x, y, x, y);
            labels[idx] = label;
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                bbox = (bbox.0.min(cx), bbox.1.min(cy), bbox.2.max(cx), bbox.3.max(cy));
                for &(dx, dy) in &DIRS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if !mask.is_set(nx, ny) {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if labels[nidx] == 0 {
                        labels[nidx] = label;
                        stack.push((nx, ny));
                    }
                }
            }
            comps.push(Component {
                label,
                start: (x, y),
                bbox,
            });
        }
    }
    (labels, comps)
}

/// Moore-neighbour tracing from the component's first pixel in raster order.
fn trace(labels: &[u32], width: usize, height: usize, comp: &Component) -> Contour {
    let inside = |x: i32, y: i32| {
        x >= 0
            && y >= 0
            && (x as usize) < width
            && (y as usize) < height
            && labels[y as usize * width + x as usize] == comp.label
    };

    let start = comp.start;
    let mut points = vec![start];
    let mut cur = start;
    // Pixel left of the raster-first pixel is background.
    let mut back = WEST;
    let mut first_move: Option<usize> = None;
    let (bw, bh) = (
        (comp.bbox.2 - comp.bbox.0 + 1) as usize,
        (comp.bbox.3 - comp.bbox.1 + 1) as usize,
    );
    let max_steps = 4 * bw * bh + 8;

    for _ in 0..max_steps {
        let found = (1..=8)
            .map(|i| (back + i) % 8)
            .find(|&d| inside(cur.0 + DIRS[d].0, cur.1 + DIRS[d].1));
        let Some(d) = found else {
            break;
        };
        if cur == start {
            match first_move {
                Some(m) if m == d => break,
                None => first_move = Some(d),
                _ => {}
            }
        }
        let next = (cur.0 + DIRS[d].0, cur.1 + DIRS[d].1);
        let prev = DIRS[(d + 7) % 8];
        back = dir_index(
            cur.0 + prev.0 - next.0,
            cur.1 + prev.1 - next.1,
        );
        cur = next;
        points.push(cur);
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    Contour { points }
}

/// Trace the outer contour of every component whose bounding box perimeter
/// lies in `[min_len, max_len]`.
pub(crate) fn find_outer_contours(mask: &BinaryMask, min_len: f32, max_len: f32) -> Vec<Contour> {
    let (labels, comps) = label_components(mask);
    comps
        .iter()
        .filter(|c| {
            let bbox_perimeter = 2.0 * ((c.bbox.2 - c.bbox.0 + 1) + (c.bbox.3 - c.bbox.1 + 1)) as f32;
            bbox_perimeter >= min_len && bbox_perimeter <= 2.0 * max_len
        })
        .map(|c| trace(&labels, mask.width, mask.height, c))
        .filter(|c| {
            let n = c.points.len() as f32;
            n >= min_len && n <= max_len
        })
        .collect()
}
