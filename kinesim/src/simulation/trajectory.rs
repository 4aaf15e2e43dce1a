//! Recorded trajectories
//!
//! Little-endian binary layout:
//! - header tag `KinematicsEnginev1`, 7-bit varint length prefix + UTF-8 bytes
//! - `i32` body count, then per body position (3×`f64`), velocity (3×`f64`), mass (`f64`)
//! - records until end of stream: time (`f64`), then per body position and velocity
//!
//! A header that does not match is an error. A truncated or unreadable
//! trailing record simply ends the trajectory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::simulation::engine::Stepper;
use crate::simulation::projectile::Projectile;
use crate::simulation::states::{Body, NVec3};

pub const HEADER: &str = "KinematicsEnginev1";

/// Longest tag the reader accepts before deciding the file is not ours
const MAX_TAG_LEN: usize = 256;

/// Position and velocity of one body at one recorded tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedState {
    pub position: NVec3,
    pub velocity: NVec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFrame {
    pub time: f64,
    pub states: Vec<RecordedState>,
}

// =========================================================================================
// Writing
// =========================================================================================

pub struct TrajectoryWriter<W: Write> {
    writer: W,
    body_count: Option<usize>, // set once the initial conditions are written
}

impl<W: Write> TrajectoryWriter<W> {
    pub fn new(mut writer: W) -> Result<Self> {
        write_tag(&mut writer, HEADER)?;
        Ok(Self { writer, body_count: None })
    }

    /// Body count, initial states and masses; written once
    pub fn write_initial_conditions(&mut self, bodies: &[Body]) -> Result<()> {
        if self.body_count.is_some() {
            return Ok(());
        }
        let count = i32::try_from(bodies.len())
            .map_err(|_| SimError::TrajectoryFormat(format!("too many bodies: {}", bodies.len())))?;
        self.writer.write_all(&count.to_le_bytes())?;
        for body in bodies {
            let p = body.projectile();
            write_vector(&mut self.writer, &p.position)?;
            write_vector(&mut self.writer, &p.velocity)?;
            self.writer.write_all(&p.mass().to_le_bytes())?;
        }
        self.body_count = Some(bodies.len());
        Ok(())
    }

    pub fn write_point(&mut self, time: f64, bodies: &[Body]) -> Result<()> {
        match self.body_count {
            None => self.write_initial_conditions(bodies)?,
            Some(count) if count != bodies.len() => {
                return Err(SimError::TrajectoryFormat(format!(
                    "body count changed from {count} to {} while recording",
                    bodies.len()
                )));
            }
            Some(_) => {}
        }
        self.writer.write_all(&time.to_le_bytes())?;
        for body in bodies {
            write_vector(&mut self.writer, &body.position())?;
            write_vector(&mut self.writer, &body.velocity())?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Drive `stepper` until `duration` or a stop condition, recording every
/// tick (the halting one included). Returns the number of recorded ticks.
pub fn preprocess<S: Stepper + ?Sized>(stepper: &mut S, path: impl AsRef<Path>, duration: f64, time_step: f64) -> Result<usize> {
    if !(time_step.is_finite() && time_step > 0.0) {
        return Err(SimError::InvalidTimestep(time_step));
    }
    let file = File::create(path.as_ref())?;
    let mut writer = TrajectoryWriter::new(BufWriter::new(file))?;
    writer.write_initial_conditions(stepper.engine().bodies())?;

    let mut ticks = 0;
    while stepper.engine().time() < duration {
        debug!(time = stepper.engine().time(), "preprocessing");
        let keep_going = stepper.increment(time_step)?;
        let engine = stepper.engine();
        writer.write_point(engine.time(), engine.bodies())?;
        ticks += 1;
        if !keep_going {
            break;
        }
    }
    writer.finish()?;
    info!(path = %path.as_ref().display(), ticks, "trajectory written");
    Ok(ticks)
}

// =========================================================================================
// Reading
// =========================================================================================

pub struct TrajectoryReader<R: Read> {
    reader: R,
    initial: Vec<Projectile>,
    finished: bool,
}

impl<R: Read> TrajectoryReader<R> {
    /// Reads and checks the header and the initial conditions
    pub fn new(mut reader: R) -> Result<Self> {
        let tag = read_tag(&mut reader)?;
        if tag != HEADER {
            return Err(SimError::TrajectoryFormat(format!("unexpected header {tag:?}")));
        }
        let count = read_i32(&mut reader)?;
        let count = usize::try_from(count).map_err(|_| SimError::TrajectoryFormat(format!("negative body count {count}")))?;

        let initial = (0..count)
            .map(|_| {
                let position = read_vector(&mut reader)?;
                let velocity = read_vector(&mut reader)?;
                let mass = read_f64(&mut reader)?;
                Projectile::new(position, velocity, mass)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { reader, initial, finished: false })
    }

    pub fn initial(&self) -> &[Projectile] {
        &self.initial
    }

    fn read_frame(&mut self) -> std::io::Result<TrajectoryFrame> {
        let time = read_f64(&mut self.reader)?;
        let states = (0..self.initial.len())
            .map(|_| {
                Ok(RecordedState {
                    position: read_vector(&mut self.reader)?,
                    velocity: read_vector(&mut self.reader)?,
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(TrajectoryFrame { time, states })
    }
}

impl<R: Read> Iterator for TrajectoryReader<R> {
    type Item = TrajectoryFrame;

    fn next(&mut self) -> Option<TrajectoryFrame> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(frame) => Some(frame),
            Err(error) => {
                // end of stream, or a partial record at the tail
                debug!(%error, "trajectory ended");
                self.finished = true;
                None
            }
        }
    }
}

// =========================================================================================
// Playback
// =========================================================================================

/// Where playback stands: index of the next unread frame and the time of the
/// last applied one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    pub next_frame: usize,
    pub time: f64,
}

/// A trajectory held in memory, replayed against an engine clock
#[derive(Debug, Clone)]
pub struct Playback {
    initial: Vec<RecordedState>,
    frames: Vec<TrajectoryFrame>,
    bodies: Vec<Projectile>,
    cursor: PlaybackCursor,
}

impl Playback {
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = TrajectoryReader::new(reader)?;
        let bodies = reader.initial().to_vec();
        let initial = bodies
            .iter()
            .map(|p| RecordedState { position: p.position, velocity: p.velocity })
            .collect();
        let frames = reader.by_ref().collect();
        Ok(Self {
            initial,
            frames,
            bodies,
            cursor: PlaybackCursor { next_frame: 0, time: 0.0 },
        })
    }

    pub fn bodies(&self) -> &[Projectile] {
        &self.bodies
    }

    pub fn frames(&self) -> &[TrajectoryFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// Apply recorded frames until the last applied one is at or after `time`
    pub fn advance_to(&mut self, time: f64) {
        while self.cursor.time < time && self.cursor.next_frame < self.frames.len() {
            let frame = &self.frames[self.cursor.next_frame];
            apply(&mut self.bodies, &frame.states);
            self.cursor = PlaybackCursor { next_frame: self.cursor.next_frame + 1, time: frame.time };
        }
    }

    /// Jump back (or forward) to a previously taken cursor
    pub fn seek(&mut self, cursor: PlaybackCursor) {
        let next_frame = cursor.next_frame.min(self.frames.len());
        let states = match next_frame.checked_sub(1) {
            Some(last) => &self.frames[last].states,
            None => &self.initial,
        };
        apply(&mut self.bodies, states);
        self.cursor = PlaybackCursor { next_frame, time: cursor.time };
    }
}

fn apply(bodies: &mut [Projectile], states: &[RecordedState]) {
    for (body, state) in bodies.iter_mut().zip(states) {
        body.position = state.position;
        body.velocity = state.velocity;
    }
}

// =========================================================================================
// Primitive encoding
// =========================================================================================

fn write_tag<W: Write>(writer: &mut W, tag: &str) -> Result<()> {
    let mut len = tag.len();
    loop {
        let byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            writer.write_all(&[byte])?;
            break;
        }
        writer.write_all(&[byte | 0x80])?;
    }
    writer.write_all(tag.as_bytes())?;
    Ok(())
}

fn read_tag<R: Read>(reader: &mut R) -> Result<String> {
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        len |= usize::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(SimError::TrajectoryFormat("malformed header length".into()));
        }
    }
    if len > MAX_TAG_LEN {
        return Err(SimError::TrajectoryFormat(format!("header length {len} too long")));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| SimError::TrajectoryFormat("header is not UTF-8".into()))
}

fn write_vector<W: Write>(writer: &mut W, v: &NVec3) -> std::io::Result<()> {
    for c in v.iter() {
        writer.write_all(&c.to_le_bytes())?;
    }
    Ok(())
}

fn read_f64<R: Read>(reader: &mut R) -> std::io::Result<f64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(f64::from_le_bytes(bytes))
}

fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

fn read_vector<R: Read>(reader: &mut R) -> std::io::Result<NVec3> {
    Ok(NVec3::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies() -> Vec<Body> {
        vec![
            Projectile::new(NVec3::new(1.0, 2.0, 3.0), NVec3::new(0.5, 0.0, 0.0), 2.0).unwrap().into(),
            Projectile::at_rest(NVec3::zeros(), 1.0).unwrap().into(),
        ]
    }

    fn recorded() -> Vec<u8> {
        let mut writer = TrajectoryWriter::new(Vec::new()).unwrap();
        let mut bodies = bodies();
        writer.write_initial_conditions(&bodies).unwrap();
        for tick in 1..=3 {
            if let Body::Point(p) = &mut bodies[0] {
                p.position.x += 1.0;
            }
            writer.write_point(f64::from(tick) * 0.5, &bodies).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn header_layout() {
        let bytes = recorded();
        assert_eq!(usize::from(bytes[0]), HEADER.len());
        assert_eq!(&bytes[1..=HEADER.len()], HEADER.as_bytes());
        let count = i32::from_le_bytes(bytes[HEADER.len() + 1..HEADER.len() + 5].try_into().unwrap());
        assert_eq!(count, 2);
    }

    #[test]
    fn frames_read_back() {
        let bytes = recorded();
        let reader = TrajectoryReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.initial().len(), 2);
        assert_eq!(reader.initial()[0].mass(), 2.0);

        let frames: Vec<_> = reader.collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].time, 1.5);
        assert_eq!(frames[2].states[0].position, NVec3::new(4.0, 2.0, 3.0));
        assert_eq!(frames[2].states[0].velocity, NVec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn truncated_tail_ends_gracefully() {
        let mut bytes = recorded();
        bytes.truncate(bytes.len() - 5);
        let frames: Vec<_> = TrajectoryReader::new(bytes.as_slice()).unwrap().collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn foreign_header_is_rejected() {
        let mut bytes = Vec::new();
        write_tag(&mut bytes, "SomethingElse").unwrap();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(TrajectoryReader::new(bytes.as_slice()), Err(SimError::TrajectoryFormat(_))));
    }

    #[test]
    fn playback_follows_clock_and_seeks() {
        let mut playback = Playback::from_reader(recorded().as_slice()).unwrap();
        assert_eq!(playback.len(), 3);

        playback.advance_to(0.7);
        // first frame at or after 0.7 is t = 1.0
        assert_eq!(playback.bodies()[0].position.x, 3.0);
        let cursor = playback.cursor();

        playback.advance_to(10.0);
        assert_eq!(playback.bodies()[0].position.x, 4.0);

        playback.seek(cursor);
        assert_eq!(playback.bodies()[0].position.x, 3.0);
        playback.seek(PlaybackCursor { next_frame: 0, time: 0.0 });
        assert_eq!(playback.bodies()[0].position.x, 1.0);
    }
}
