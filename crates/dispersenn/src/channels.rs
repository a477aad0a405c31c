//! The two output channels (dispersal, density) as a fixed-size pair.
//!
//! Every map, tensor or statistic that has one value per channel is carried as
//! a [`ChannelPair`]. There is no trailing "channel" dimension anywhere in the
//! crate; per-channel operations go through [`ChannelPair::map`] or
//! [`ChannelPair::zip`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two predicted surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Dispersal rate (blue raster channel, index 0 on disk).
    Dispersal,
    /// Population density (red raster channel, index 1 on disk).
    Density,
}

impl Channel {
    /// Both channels in on-disk order.
    pub const ALL: [Channel; 2] = [Channel::Dispersal, Channel::Density];

    /// Position of the channel in channel-last arrays on disk.
    pub fn index(self) -> usize {
        match self {
            Channel::Dispersal => 0,
            Channel::Density => 1,
        }
    }

    /// Lower-case channel name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Dispersal => "dispersal",
            Channel::Density => "density",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value for each of the two channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelPair<T> {
    /// Dispersal channel.
    pub dispersal: T,
    /// Density channel.
    pub density: T,
}

impl<T> ChannelPair<T> {
    /// Build a pair from its two halves.
    pub fn new(dispersal: T, density: T) -> Self {
        ChannelPair { dispersal, density }
    }

    /// Build a pair by evaluating `f` once per channel.
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        ChannelPair { dispersal: f(Channel::Dispersal), density: f(Channel::Density) }
    }

    /// Borrow the value for `channel`.
    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Dispersal => &self.dispersal,
            Channel::Density => &self.density,
        }
    }

    /// Mutably borrow the value for `channel`.
    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        match channel {
            Channel::Dispersal => &mut self.dispersal,
            Channel::Density => &mut self.density,
        }
    }

    /// Borrow both halves.
    pub fn each_ref(&self) -> ChannelPair<&T> {
        ChannelPair { dispersal: &self.dispersal, density: &self.density }
    }

    /// Apply `f` to each channel independently.
    pub fn map<U>(self, mut f: impl FnMut(Channel, T) -> U) -> ChannelPair<U> {
        ChannelPair {
            dispersal: f(Channel::Dispersal, self.dispersal),
            density: f(Channel::Density, self.density),
        }
    }

    /// Combine two pairs channel by channel.
    pub fn zip<U, V>(
        self,
        other: ChannelPair<U>,
        mut f: impl FnMut(Channel, T, U) -> V,
    ) -> ChannelPair<V> {
        ChannelPair {
            dispersal: f(Channel::Dispersal, self.dispersal, other.dispersal),
            density: f(Channel::Density, self.density, other.density),
        }
    }

    /// Fallible per-channel map; stops at the first error.
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(Channel, T) -> Result<U, E>,
    ) -> Result<ChannelPair<U>, E> {
        Ok(ChannelPair {
            dispersal: f(Channel::Dispersal, self.dispersal)?,
            density: f(Channel::Density, self.density)?,
        })
    }

    /// Iterate `(channel, value)` in on-disk order.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        [(Channel::Dispersal, &self.dispersal), (Channel::Density, &self.density)].into_iter()
    }
}
