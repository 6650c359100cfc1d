// Copyright 2017 Matthew Plant. This file is part of PDFEM.
//
// PDFEM is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// PDFEM is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PDFEM. If not, see <http://www.gnu.org/licenses/>.

//! Hand-off of surface geometry from the simulation thread to a consumer
//! such as a renderer.
//!
//! [`channel`] returns a triple buffer: the writer fills its back buffer and
//! publishes it by swapping with the shared middle slot, the reader swaps the
//! middle slot into its front buffer when something new was published. The
//! lock is only held for the swap, so neither side waits on the other's work
//! and the reader never sees a partially written frame.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use cgmath::Vector3;

use crate::boundary::Boundary;
use crate::geom::Real;

/// Read-only copy of a boundary surface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceSnapshot {
    pub positions: Vec<Vector3<Real>>,
    pub normals: Vec<Vector3<Real>>,
    pub faces: Vec<[usize; 3]>,
    /// Simulation step the geometry was taken at.
    pub frame: u64,
}

impl SurfaceSnapshot {
    /// Overwrites `self` with the current state of `boundary`, reusing its
    /// allocations.
    pub fn copy_from(&mut self, boundary: &Boundary, frame: u64) {
        let verts = &boundary.surface.verts;
        self.positions.clear();
        self.positions.extend(verts.iter().map(|v| v.p));
        self.normals.clear();
        self.normals.extend(verts.iter().map(|v| v.n));
        self.faces.clear();
        self.faces.extend(boundary.surface.faces.iter().map(|f| f.v));
        self.frame = frame;
    }
}

impl From<&Boundary> for SurfaceSnapshot {
    fn from(boundary: &Boundary) -> Self {
        let mut s = SurfaceSnapshot::default();
        s.copy_from(boundary, 0);
        s
    }
}

struct Middle<T> {
    value: T,
    fresh: bool,
}

fn lock<T>(m: &Mutex<Middle<T>>) -> MutexGuard<'_, Middle<T>> {
    // A panic on the other side cannot leave the slot half swapped.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Writer<T> {
    back: T,
    shared: Arc<Mutex<Middle<T>>>,
}

pub struct Reader<T> {
    front: T,
    shared: Arc<Mutex<Middle<T>>>,
}

pub fn channel<T: Default>() -> (Writer<T>, Reader<T>) {
    let shared = Arc::new(Mutex::new(Middle {
        value: T::default(),
        fresh: false,
    }));
    (
        Writer {
            back: T::default(),
            shared: shared.clone(),
        },
        Reader {
            front: T::default(),
            shared,
        },
    )
}

impl<T> Writer<T> {
    /// The back buffer. Its contents are whatever was swapped in by the last
    /// publish, so callers should overwrite it completely.
    pub fn write(&mut self) -> &mut T {
        &mut self.back
    }

    /// Makes the back buffer visible to the reader. A frame the reader never
    /// picked up is dropped in favour of this one.
    pub fn publish(&mut self) {
        let mut middle = lock(&self.shared);
        mem::swap(&mut middle.value, &mut self.back);
        middle.fresh = true;
    }
}

impl<T> Reader<T> {
    /// The most recently published value, or the last one read if nothing
    /// new was published.
    pub fn read(&mut self) -> &T {
        {
            let mut middle = lock(&self.shared);
            if middle.fresh {
                mem::swap(&mut middle.value, &mut self.front);
                middle.fresh = false;
            }
        }
        &self.front
    }

    pub fn has_update(&self) -> bool {
        lock(&self.shared).fresh
    }
}
