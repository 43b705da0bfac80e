// ============================================================================
// Inpainting algorithms: fast marching (Telea) and exemplar PatchMatch
// ============================================================================
//
// Both routines work on interleaved 8-bit buffers with 1, 3 or 4 channels and a
// single-channel mask where any non-zero value marks a hole pixel. Pixels
// outside the hole are copied through unchanged.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

// -- Method selection ------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InpaintMethod {
    /// Fast marching: fills boundary-inward from a weighted neighbourhood.
    #[default]
    Telea,
    /// Exemplar-based: copies best-matching patches, onion-peeled.
    PatchMatch,
}

impl InpaintMethod {
    pub fn label(&self) -> &'static str {
        match self {
            InpaintMethod::Telea => "Fast Marching (Telea)",
            InpaintMethod::PatchMatch => "PatchMatch",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            InpaintMethod::Telea => "telea",
            InpaintMethod::PatchMatch => "patchmatch",
        }
    }

    pub fn all() -> &'static [InpaintMethod] {
        &[InpaintMethod::Telea, InpaintMethod::PatchMatch]
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "telea" | "fmm" => Some(InpaintMethod::Telea),
            "patchmatch" | "patch" => Some(InpaintMethod::PatchMatch),
            _ => None,
        }
    }
}

// -- Shared helpers --------------------------------------------------------

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

/// Narrow-band entry; ordered so `BinaryHeap` pops the smallest arrival time.
#[derive(Clone, Copy, Debug)]
struct BandPixel {
    t: f32,
    seq: u64,
    x: usize,
    y: usize,
}

impl PartialEq for BandPixel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BandPixel {}

impl PartialOrd for BandPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BandPixel {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[inline]
fn neighbours4(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    let xi = x as i64;
    let yi = y as i64;
    [(xi - 1, yi), (xi + 1, yi), (xi, yi - 1), (xi, yi + 1)]
        .into_iter()
        .filter(move |&(nx, ny)| nx >= 0 && ny >= 0 && nx < w as i64 && ny < h as i64)
        .map(|(nx, ny)| (nx as usize, ny as usize))
}

// -- Fast marching (Telea) -------------------------------------------------

struct Field {
    w: usize,
    h: usize,
    flag: Vec<u8>,
    t: Vec<f32>,
}

impl Field {
    /// Flag at `(x, y)`; out-of-range reads as `INSIDE` so it never contributes.
    #[inline]
    fn flag_at(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.w as i64 || y >= self.h as i64 {
            INSIDE
        } else {
            self.flag[y as usize * self.w + x as usize]
        }
    }

    #[inline]
    fn t_at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.w as i64 || y >= self.h as i64 {
            f32::INFINITY
        } else {
            self.t[y as usize * self.w + x as usize]
        }
    }

    /// Eikonal update from two orthogonal neighbours.
    fn solve(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f32 {
        let a = self.t_at(x1, y1);
        let b = self.t_at(x2, y2);
        let a_ok = self.flag_at(x1, y1) != INSIDE;
        let b_ok = self.flag_at(x2, y2) != INSIDE;
        match (a_ok, b_ok) {
            (true, true) => {
                if (a - b).abs() >= 1.0 {
                    1.0 + a.min(b)
                } else {
                    let d = a - b;
                    (a + b + (2.0 - d * d).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + a,
            (false, true) => 1.0 + b,
            (false, false) => 1.0e6,
        }
    }

    fn arrival_time(&self, x: usize, y: usize) -> f32 {
        let (x, y) = (x as i64, y as i64);
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    /// Gradient of the arrival time, one-sided where a neighbour is unknown.
    fn grad_t(&self, x: usize, y: usize) -> (f32, f32) {
        let (x, y) = (x as i64, y as i64);
        let tc = self.t_at(x, y);
        let axis = |(px, py): (i64, i64), (nx, ny): (i64, i64)| -> f32 {
            let p_ok = self.flag_at(px, py) != INSIDE;
            let n_ok = self.flag_at(nx, ny) != INSIDE;
            match (p_ok, n_ok) {
                (true, true) => (self.t_at(px, py) - self.t_at(nx, ny)) * 0.5,
                (true, false) => self.t_at(px, py) - tc,
                (false, true) => tc - self.t_at(nx, ny),
                (false, false) => 0.0,
            }
        };
        (axis((x + 1, y), (x - 1, y)), axis((x, y + 1), (x, y - 1)))
    }
}

/// Per-channel image gradient at `(x, y)`, using only non-hole neighbours.
fn grad_image(
    img: &[u8],
    field: &Field,
    channels: usize,
    x: usize,
    y: usize,
    c: usize,
) -> (f32, f32) {
    let (xi, yi) = (x as i64, y as i64);
    let w = field.w;
    let val = |px: i64, py: i64| img[(py as usize * w + px as usize) * channels + c] as f32;
    let center = val(xi, yi);
    let axis = |(px, py): (i64, i64), (nx, ny): (i64, i64)| -> f32 {
        let p_ok = field.flag_at(px, py) != INSIDE;
        let n_ok = field.flag_at(nx, ny) != INSIDE;
        match (p_ok, n_ok) {
            (true, true) => (val(px, py) - val(nx, ny)) * 0.5,
            (true, false) => val(px, py) - center,
            (false, true) => center - val(nx, ny),
            (false, false) => 0.0,
        }
    };
    (
        axis((xi + 1, yi), (xi - 1, yi)),
        axis((xi, yi + 1), (xi, yi - 1)),
    )
}

/// Offsets within a disc of `radius`, excluding the centre.
fn disc_offsets(radius: u32) -> Vec<(i64, i64)> {
    let r = radius.max(1) as i64;
    let r2 = r * r;
    let mut out = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx != 0 || dy != 0) && dx * dx + dy * dy <= r2 {
                out.push((dx, dy));
            }
        }
    }
    out
}

/// Fast-marching inpainting after Telea (2004).
///
/// Hole pixels are visited in order of their distance from the hole boundary.
/// Each is estimated from the known pixels within `radius`, weighted by
/// direction along the distance gradient, distance, and level-set proximity,
/// with a first-order correction from the image gradient at each sample.
pub fn inpaint_telea(
    src: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    mask: &[u8],
    radius: u32,
) -> Vec<u8> {
    let mut out = src.to_vec();
    let (w, h) = (width as usize, height as usize);
    let n = w * h;
    if n == 0 || channels == 0 {
        return out;
    }

    let mut field = Field {
        w,
        h,
        flag: vec![KNOWN; n],
        t: vec![0.0; n],
    };
    for i in 0..n {
        if mask[i] > 0 {
            field.flag[i] = INSIDE;
            field.t[i] = 1.0e6;
        }
    }

    // Initial narrow band: known pixels touching the hole.
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if field.flag[i] != KNOWN {
                continue;
            }
            if neighbours4(x, y, w, h).any(|(nx, ny)| field.flag[ny * w + nx] == INSIDE) {
                field.flag[i] = BAND;
                heap.push(BandPixel { t: 0.0, seq, x, y });
                seq += 1;
            }
        }
    }

    let offsets = disc_offsets(radius);
    let mut acc = vec![0.0f32; channels];

    while let Some(p) = heap.pop() {
        let pi = p.y * w + p.x;
        if field.flag[pi] == KNOWN {
            continue;
        }
        field.flag[pi] = KNOWN;

        for (nx, ny) in neighbours4(p.x, p.y, w, h) {
            let ni = ny * w + nx;
            if field.flag[ni] != INSIDE {
                continue;
            }
            let t = field.arrival_time(nx, ny);
            field.t[ni] = t;
            let (gx, gy) = field.grad_t(nx, ny);

            acc.iter_mut().for_each(|a| *a = 0.0);
            let mut weight_sum = 0.0f32;
            for &(dx, dy) in &offsets {
                let qx = nx as i64 + dx;
                let qy = ny as i64 + dy;
                if field.flag_at(qx, qy) == INSIDE {
                    continue;
                }
                let qi = qy as usize * w + qx as usize;
                // Vector from the sample to the pixel being filled.
                let rx = -dx as f32;
                let ry = -dy as f32;
                let len2 = rx * rx + ry * ry;
                let dst = 1.0 / (len2 * len2.sqrt());
                let lev = 1.0 / (1.0 + (field.t[qi] - t).abs());
                let mut dir = rx * gx + ry * gy;
                if dir.abs() <= 0.01 {
                    dir = 1.0e-6;
                }
                let weight = (dst * lev * dir).abs();
                for (c, a) in acc.iter_mut().enumerate() {
                    let (ix, iy) = grad_image(&out, &field, channels, qx as usize, qy as usize, c);
                    let sample = out[qi * channels + c] as f32 + ix * rx + iy * ry;
                    *a += weight * sample;
                }
                weight_sum += weight;
            }

            if weight_sum > 0.0 {
                for (c, a) in acc.iter().enumerate() {
                    out[ni * channels + c] = (a / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
            }

            field.flag[ni] = BAND;
            heap.push(BandPixel {
                t,
                seq,
                x: nx,
                y: ny,
            });
            seq += 1;
        }
    }

    out
}

// -- PatchMatch inpainting -------------------------------------------------
//
// SSD ignores hole pixels in the query patch, so matches are driven by the
// surrounding context and never by the blemish being removed. Each outer pass
// fills the current boundary layer of the hole; filled pixels become source
// candidates for the next layer.

struct Exemplar<'a> {
    img: &'a [u8],
    hole: &'a [bool],
    w: i32,
    h: i32,
    channels: usize,
}

impl Exemplar<'_> {
    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h
    }

    #[inline]
    fn is_hole(&self, x: i32, y: i32) -> bool {
        self.hole[(y * self.w + x) as usize]
    }

    /// Masked SSD between the patches centred on `a` and `b`. Only positions
    /// that are non-hole on both sides are compared; `f32::MAX` when fewer
    /// than `min_valid` positions qualify.
    fn patch_ssd(&self, a: (i32, i32), b: (i32, i32), half: i32, min_valid: usize) -> f32 {
        let colour_channels = self.channels.min(3);
        let mut ssd = 0.0f32;
        let mut count = 0usize;
        for dy in -half..=half {
            for dx in -half..=half {
                let (ax, ay) = (a.0 + dx, a.1 + dy);
                let (bx, by) = (b.0 + dx, b.1 + dy);
                if !self.in_bounds(ax, ay) || !self.in_bounds(bx, by) {
                    continue;
                }
                if self.is_hole(ax, ay) || self.is_hole(bx, by) {
                    continue;
                }
                let ai = (ay * self.w + ax) as usize * self.channels;
                let bi = (by * self.w + bx) as usize * self.channels;
                for c in 0..colour_channels {
                    let d = self.img[ai + c] as f32 - self.img[bi + c] as f32;
                    ssd += d * d;
                }
                count += 1;
            }
        }
        if count < min_valid {
            f32::MAX
        } else {
            ssd / count as f32
        }
    }
}

#[derive(Clone, Copy)]
struct Match {
    ox: i32,
    oy: i32,
    ssd: f32,
}

#[inline]
fn lcg(state: u64) -> u64 {
    state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407)
}

/// One propagation + random-search sweep over `pixels`.
fn refine_matches(
    ex: &Exemplar<'_>,
    pixels: &[(i32, i32)],
    nnf: &mut [Match],
    half: i32,
    min_valid: usize,
    iter: usize,
) {
    let forward = iter % 2 == 0;
    let neighbours: [(i32, i32); 2] = if forward {
        [(-1, 0), (0, -1)]
    } else {
        [(1, 0), (0, 1)]
    };
    let max_radius = ex.w.max(ex.h) as f32;

    let order: Box<dyn Iterator<Item = &(i32, i32)>> = if forward {
        Box::new(pixels.iter())
    } else {
        Box::new(pixels.iter().rev())
    };

    for &(hx, hy) in order {
        let idx = (hy * ex.w + hx) as usize;
        let mut best = nnf[idx];

        let consider = |cx: i32, cy: i32, best: &mut Match| {
            if !ex.in_bounds(cx, cy) || ex.is_hole(cx, cy) {
                return;
            }
            let ssd = ex.patch_ssd((hx, hy), (cx, cy), half, min_valid);
            if ssd < best.ssd {
                *best = Match {
                    ox: cx - hx,
                    oy: cy - hy,
                    ssd,
                };
            }
        };

        for (ndx, ndy) in neighbours {
            let (nx, ny) = (hx + ndx, hy + ndy);
            if !ex.in_bounds(nx, ny) {
                continue;
            }
            let n = nnf[(ny * ex.w + nx) as usize];
            if n.ssd == f32::MAX {
                continue;
            }
            consider(hx + n.ox, hy + n.oy, &mut best);
        }

        let mut rng = (hx as u64)
            .wrapping_mul(6364136223846793005)
            .wrapping_add((hy as u64).wrapping_mul(982451653))
            .wrapping_add(iter as u64 * 1234567891);
        let mut search_r = max_radius;
        while search_r >= 1.0 {
            rng = lcg(rng);
            let ra = (rng >> 33) as f32 / (u32::MAX >> 1) as f32;
            rng = lcg(rng);
            let rb = (rng >> 33) as f32 / (u32::MAX >> 1) as f32;
            let cx = (hx as f32 + best.ox as f32 + (ra * 2.0 - 1.0) * search_r).round() as i32;
            let cy = (hy as f32 + best.oy as f32 + (rb * 2.0 - 1.0) * search_r).round() as i32;
            consider(cx, cy, &mut best);
            search_r *= 0.5;
        }

        nnf[idx] = best;
    }
}

/// Fallback for boundary pixels with no usable match: mean of the non-hole
/// 8-neighbours (always at least one for a boundary pixel).
fn mean_of_known_neighbours(
    img: &[u8],
    hole: &[bool],
    w: i32,
    h: i32,
    channels: usize,
    x: i32,
    y: i32,
) -> Vec<u8> {
    let mut sum = vec![0u32; channels];
    let mut count = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let (nx, ny) = (x + dx, y + dy);
            if (dx == 0 && dy == 0) || nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let ni = (ny * w + nx) as usize;
            if hole[ni] {
                continue;
            }
            for (c, s) in sum.iter_mut().enumerate() {
                *s += img[ni * channels + c] as u32;
            }
            count += 1;
        }
    }
    let i = (y * w + x) as usize * channels;
    if count == 0 {
        return img[i..i + channels].to_vec();
    }
    sum.iter()
        .map(|s| ((*s as f32) / count as f32).round() as u8)
        .collect()
}

/// Exemplar-based inpainting with onion peeling and PatchMatch refinement.
pub fn inpaint_patchmatch(
    src: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    mask: &[u8],
    patch_size: u32,
    iterations: usize,
) -> Vec<u8> {
    let (w, h) = (width as i32, height as i32);
    let total = (width * height) as usize;
    let mut out = src.to_vec();
    if total == 0 || channels == 0 {
        return out;
    }

    let half = (patch_size.max(3) / 2) as i32;
    let min_valid = ((half as usize * 2 + 1).pow(2) / 4).max(1);
    let mut hole: Vec<bool> = mask.iter().map(|&m| m > 0).collect();
    let mut sources: Vec<(i32, i32)> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .filter(|&(x, y)| !hole[(y * w + x) as usize])
        .collect();
    if sources.is_empty() {
        return out;
    }

    let mut nnf = vec![
        Match {
            ox: 0,
            oy: 0,
            ssd: f32::MAX,
        };
        total
    ];
    let sweeps = if iterations <= 3 { 2 } else { 4 };
    let max_layers = (w.max(h) as usize + 1) * 2;

    for _layer in 0..max_layers {
        let boundary: Vec<(i32, i32)> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                hole[(y * w + x) as usize]
                    && neighbours4(x as usize, y as usize, w as usize, h as usize)
                        .any(|(nx, ny)| !hole[ny * w as usize + nx])
            })
            .collect();
        if boundary.is_empty() {
            break;
        }

        {
            let ex = Exemplar {
                img: &out,
                hole: &hole,
                w,
                h,
                channels,
            };
            let n_src = sources.len();
            for &(hx, hy) in &boundary {
                let idx = (hy * w + hx) as usize;
                let mut rng = (hx as u64)
                    .wrapping_mul(1234567891)
                    .wrapping_add(hy as u64 * 987654321);
                let mut best = nnf[idx];
                for attempt in 0..5 {
                    let si = if attempt == 0 {
                        let h = (hx as usize).wrapping_mul(7919) + (hy as usize).wrapping_mul(6271);
                        h % n_src
                    } else {
                        rng = lcg(rng);
                        (rng >> 33) as usize % n_src
                    };
                    let (sx, sy) = sources[si];
                    let ssd = ex.patch_ssd((hx, hy), (sx, sy), half, min_valid);
                    if attempt == 0 || ssd < best.ssd {
                        best = Match {
                            ox: sx - hx,
                            oy: sy - hy,
                            ssd,
                        };
                    }
                }
                nnf[idx] = best;
            }

            for iter in 0..sweeps {
                refine_matches(&ex, &boundary, &mut nnf, half, min_valid, iter);
            }
        }

        // Gather first: `out` is both the sampling source and the target.
        let fills: Vec<(usize, Vec<u8>)> = boundary
            .iter()
            .map(|&(hx, hy)| {
                let dst = (hy * w + hx) as usize;
                let m = nnf[dst];
                let (sx, sy) = (hx + m.ox, hy + m.oy);
                let matched = m.ssd != f32::MAX
                    && sx >= 0
                    && sy >= 0
                    && sx < w
                    && sy < h
                    && !hole[(sy * w + sx) as usize];
                let pixel = if matched {
                    let s = (sy * w + sx) as usize * channels;
                    out[s..s + channels].to_vec()
                } else {
                    mean_of_known_neighbours(&out, &hole, w, h, channels, hx, hy)
                };
                (dst, pixel)
            })
            .collect();
        for (dst, pixel) in fills {
            let d = dst * channels;
            out[d..d + channels].copy_from_slice(&pixel);
        }

        for &(x, y) in &boundary {
            hole[(y * w + x) as usize] = false;
            sources.push((x, y));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(w: u32, h: u32) -> Vec<u8> {
        let mut v = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                v.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        v
    }

    fn square_mask(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> Vec<u8> {
        let mut m = vec![0u8; (w * h) as usize];
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                m[(y * w + x) as usize] = 255;
            }
        }
        m
    }

    #[test]
    fn empty_mask_is_identity() {
        let src = gradient_rgb(16, 16);
        let mask = vec![0u8; 256];
        assert_eq!(inpaint_telea(&src, 16, 16, 3, &mask, 5), src);
        assert_eq!(inpaint_patchmatch(&src, 16, 16, 3, &mask, 5, 3), src);
    }

    #[test]
    fn telea_fills_flat_region_with_surrounding_colour() {
        let (w, h) = (20u32, 20u32);
        let mut src = vec![90u8; (w * h) as usize];
        let mask = square_mask(w, h, 8, 8, 4);
        for (i, m) in mask.iter().enumerate() {
            if *m > 0 {
                src[i] = 255;
            }
        }
        let out = inpaint_telea(&src, w, h, 1, &mask, 5);
        assert!(out.iter().all(|&v| v == 90));
    }

    #[test]
    fn telea_only_touches_hole_pixels() {
        let (w, h) = (32u32, 24u32);
        let src = gradient_rgb(w, h);
        let mask = square_mask(w, h, 10, 6, 6);
        let out = inpaint_telea(&src, w, h, 3, &mask, 3);
        for i in 0..(w * h) as usize {
            if mask[i] == 0 {
                assert_eq!(&out[i * 3..i * 3 + 3], &src[i * 3..i * 3 + 3]);
            }
        }
    }

    #[test]
    fn telea_continues_a_linear_ramp() {
        let (w, h) = (32u32, 32u32);
        let src = gradient_rgb(w, h);
        let mask = square_mask(w, h, 12, 12, 5);
        let mut corrupted = src.clone();
        for (i, m) in mask.iter().enumerate() {
            if *m > 0 {
                corrupted[i * 3..i * 3 + 3].copy_from_slice(&[255, 0, 0]);
            }
        }
        let out = inpaint_telea(&corrupted, w, h, 3, &mask, 5);
        for (i, m) in mask.iter().enumerate() {
            if *m > 0 {
                for c in 0..3 {
                    let diff = (out[i * 3 + c] as i32 - src[i * 3 + c] as i32).abs();
                    assert!(diff <= 12, "pixel {i} channel {c} off by {diff}");
                }
            }
        }
    }

    #[test]
    fn full_mask_leaves_pixels_alone() {
        let src = vec![7u8; 4 * 4 * 3];
        let mask = vec![255u8; 16];
        assert_eq!(inpaint_telea(&src, 4, 4, 3, &mask, 5), src);
        assert_eq!(inpaint_patchmatch(&src, 4, 4, 3, &mask, 5, 3), src);
    }

    #[test]
    fn patchmatch_fills_hole_from_uniform_context() {
        let (w, h) = (24u32, 24u32);
        let mut src = vec![40u8; (w * h * 3) as usize];
        let mask = square_mask(w, h, 9, 9, 5);
        for (i, m) in mask.iter().enumerate() {
            if *m > 0 {
                src[i * 3] = 250;
            }
        }
        let out = inpaint_patchmatch(&src, w, h, 3, &mask, 5, 3);
        assert!(out.iter().all(|&v| v == 40));
    }

    #[test]
    fn method_keys_round_trip() {
        for m in InpaintMethod::all() {
            assert_eq!(InpaintMethod::from_key(m.key()), Some(*m));
        }
        assert_eq!(InpaintMethod::from_key("ns"), None);
    }
}
