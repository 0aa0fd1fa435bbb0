//! Chain building: stitching same-occlusion segments into polylines.
//!
//! Downstream stroke systems consume ordered point lists, not loose segments.
//! Every resolved line is split into runs of equal occlusion, each run
//! becomes a two-point chain, and chains whose endpoints coincide in image
//! space (same occlusion level) are connected greedily. Chains keep a
//! `picked` flag so several downstream consumers can drain them
//! incrementally.
use crate::buffer::RenderBuffer;
use crate::options::ChainOptions;
use crate::types::{EdgeFlags, ObjectId};
use log::debug;
use nalgebra::{Vector2, Vector3};
use serde::Serialize;

/// One chain point with its world/image positions and occlusion level.
#[derive(Clone, Debug, Serialize)]
pub struct ChainPoint {
    pub gloc: Vector3<f64>,
    pub fbcoord: Vector2<f64>,
    pub occlusion: u32,
}

/// An ordered polyline of equal-occlusion feature-line points.
#[derive(Clone, Debug, Serialize)]
pub struct LineChain {
    pub points: Vec<ChainPoint>,
    /// Occlusion level shared by every point of the chain.
    pub level: u32,
    /// Feature flags of the source line(s).
    pub flags: EdgeFlags,
    /// Source object; `None` for pure intersection chains.
    pub object: Option<ObjectId>,
    /// Consumed-by-downstream marker, false on creation.
    pub picked: bool,
}

impl LineChain {
    /// Image-space length, the sum of point-to-point distances.
    pub fn image_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].fbcoord - w[0].fbcoord).norm())
            .sum()
    }
}

/// Per-pass chain counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainStats {
    pub chains: usize,
    pub connected: usize,
    pub discarded_short: usize,
}

/// Builds chains from every classified line's segment runs.
pub fn build_chains(buffer: &RenderBuffer, options: &ChainOptions) -> (Vec<LineChain>, ChainStats) {
    let mut stats = ChainStats::default();
    let mut chains: Vec<LineChain> = Vec::new();

    for line in &buffer.lines {
        if line.discarded || line.flags.is_empty() {
            continue;
        }
        let lg = buffer.vert(line.l).gloc;
        let rg = buffer.vert(line.r).gloc;
        let lf = buffer.vert(line.l).fb2();
        let rf = buffer.vert(line.r).fb2();

        // Merge consecutive segments sharing one occlusion count into runs.
        let mut runs: Vec<(f64, f64, u32)> = Vec::new();
        for (from, to, occlusion) in line.occlusion_ranges() {
            match runs.last_mut() {
                Some(last) if last.2 == occlusion => last.1 = to,
                _ => runs.push((from, to, occlusion)),
            }
        }

        for (from, to, occlusion) in runs {
            let point = |t: f64| ChainPoint {
                gloc: lg.lerp(&rg, t),
                fbcoord: lf.lerp(&rf, t),
                occlusion,
            };
            chains.push(LineChain {
                points: vec![point(from), point(to)],
                level: occlusion,
                flags: line.flags,
                object: line.object,
                picked: false,
            });
        }
    }

    let connected = connect_chains(&mut chains, options.connect_threshold);
    stats.connected = connected;

    if options.min_length > 0.0 {
        let before = chains.len();
        chains.retain(|c| c.image_length() >= options.min_length);
        stats.discarded_short = before - chains.len();
    }

    stats.chains = chains.len();
    debug!(
        "build_chains chains={} connected={} short={}",
        stats.chains, stats.connected, stats.discarded_short
    );
    (chains, stats)
}

/// Greedily appends chains whose endpoints coincide within `threshold`.
///
/// Returns the number of joins performed. Candidate chains are reversed when
/// their tail, not head, matches.
fn connect_chains(chains: &mut Vec<LineChain>, threshold: f64) -> usize {
    if threshold <= 0.0 {
        return 0;
    }
    let mut joins = 0usize;
    let mut out: Vec<LineChain> = Vec::with_capacity(chains.len());
    let mut pool: Vec<Option<LineChain>> = std::mem::take(chains).into_iter().map(Some).collect();

    let endpoint_close = |a: &Vector2<f64>, b: &Vector2<f64>| (a - b).norm() <= threshold;

    for i in 0..pool.len() {
        let Some(mut chain) = pool[i].take() else {
            continue;
        };
        loop {
            let tail = chain.points.last().expect("chain nonempty").fbcoord;
            let mut extended = false;
            for slot in pool.iter_mut() {
                let Some(cand) = slot.as_ref() else { continue };
                if cand.level != chain.level {
                    continue;
                }
                let head = cand.points.first().expect("chain nonempty").fbcoord;
                let cand_tail = cand.points.last().expect("chain nonempty").fbcoord;
                if endpoint_close(&tail, &head) {
                    let mut cand = slot.take().expect("checked above");
                    chain.points.extend(cand.points.drain(1..));
                    chain.flags.insert(cand.flags);
                } else if endpoint_close(&tail, &cand_tail) {
                    let mut cand = slot.take().expect("checked above");
                    cand.points.reverse();
                    chain.points.extend(cand.points.drain(1..));
                    chain.flags.insert(cand.flags);
                } else {
                    continue;
                }
                joins += 1;
                extended = true;
                break;
            }
            if !extended {
                break;
            }
        }
        out.push(chain);
    }
    *chains = out;
    joins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{cut_segments, RenderLine, RenderVert};
    use crate::types::VertId;
    use nalgebra::Vector4;

    fn buffer_with_line(
        a: (f64, f64),
        b: (f64, f64),
        cuts: &[(f64, f64)],
    ) -> RenderBuffer {
        let mut buffer = RenderBuffer::default();
        let l = buffer.push_vert(RenderVert::new(
            Vector3::new(a.0, a.1, 0.0),
            Vector4::new(a.0, a.1, 0.0, 1.0),
        ));
        let r = buffer.push_vert(RenderVert::new(
            Vector3::new(b.0, b.1, 0.0),
            Vector4::new(b.0, b.1, 0.0, 1.0),
        ));
        let mut line = RenderLine::new(l, r);
        line.flags.insert(EdgeFlags::CONTOUR);
        for &(from, to) in cuts {
            line.min_occ = cut_segments(&mut line.segments, from, to);
        }
        buffer.push_line(line);
        buffer
    }

    #[test]
    fn occlusion_runs_become_separate_chains() {
        let buffer = buffer_with_line((0.0, 0.0), (1.0, 0.0), &[(0.25, 0.75)]);
        let (chains, stats) = build_chains(&buffer, &ChainOptions::default());
        assert_eq!(stats.chains, 3);
        let levels: Vec<u32> = chains.iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![0, 1, 0]);
        // Points interpolate the parametric cut positions.
        assert!((chains[1].points[0].fbcoord.x - 0.25).abs() < 1e-9);
        assert!((chains[1].points[1].fbcoord.x - 0.75).abs() < 1e-9);
    }

    #[test]
    fn touching_same_level_chains_connect() {
        let mut buffer = buffer_with_line((0.0, 0.0), (0.5, 0.0), &[]);
        let other = buffer_with_line((0.5, 0.0), (1.0, 0.0), &[]);
        let l = buffer.push_vert(other.vert(VertId(0)).clone());
        let r = buffer.push_vert(other.vert(VertId(1)).clone());
        let mut line = RenderLine::new(l, r);
        line.flags.insert(EdgeFlags::CONTOUR);
        buffer.push_line(line);

        let (chains, stats) = build_chains(&buffer, &ChainOptions::default());
        assert_eq!(stats.chains, 1);
        assert_eq!(stats.connected, 1);
        assert_eq!(chains[0].points.len(), 3);
        assert!((chains[0].image_length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn short_chains_are_discarded() {
        let buffer = buffer_with_line((0.0, 0.0), (0.001, 0.0), &[]);
        let options = ChainOptions {
            connect_threshold: 0.0,
            min_length: 0.01,
        };
        let (chains, stats) = build_chains(&buffer, &options);
        assert!(chains.is_empty());
        assert_eq!(stats.discarded_short, 1);
    }
}
