mod album;
mod artist;
mod track;

pub use album::Album;
pub use artist::Artist;
pub use track::Track;
