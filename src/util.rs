use crate::{STEPS, TRACKS};

#[macro_export]
macro_rules! some_or_continue {
	( $e:expr ) => (
		match $e {
			Some(value) => value,
			None => {
				continue
			},
		}
	)
}

/// A fixed 4x8 arena with one cell per (track, step) grid position.
///
/// Never grows; out-of-range accesses return `None` instead of panicking.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grid<T: Default + Copy> {
	cells: [[T; STEPS]; TRACKS],
}

impl<T: Default + Copy> Default for Grid<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Default + Copy> Grid<T> {
	pub fn new() -> Self {
		return Self { cells: [[T::default(); STEPS]; TRACKS] };
	}

	pub fn filled(value: T) -> Self {
		return Self { cells: [[value; STEPS]; TRACKS] };
	}

	pub fn get(&self, track: u8, step: u8) -> Option<&T> {
		self.cells.get(track as usize)?.get(step as usize)
	}

	pub fn get_mut(&mut self, track: u8, step: u8) -> Option<&mut T> {
		self.cells.get_mut(track as usize)?.get_mut(step as usize)
	}

	/// Returns false if the position is out of range, in which case nothing is written.
	pub fn set(&mut self, track: u8, step: u8, value: T) -> bool {
		match self.get_mut(track, step) {
			Some(cell) => {
				*cell = value;
				true
			}
			None => false,
		}
	}

	pub fn track_mut(&mut self, track: u8) -> Option<&mut [T; STEPS]> {
		self.cells.get_mut(track as usize)
	}

	/// Iterates `(track, step, cell)` in row-major order, i.e. ascending button id.
	pub fn iter(&self) -> impl Iterator<Item = (u8, u8, &T)> + '_ {
		self.cells.iter().enumerate().flat_map(|(track, row)| {
			row.iter().enumerate().map(move |(step, cell)| (track as u8, step as u8, cell))
		})
	}
}
