use log::LevelFilter;
use regioncachelib::region::{
    RegionCache, RegionCacheBuilder, RegionCacheError, RegionFileFactory, RegionPos,
    RegionPosCodec,
};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use std::path::Path;

pub type DefaultCache = RegionCache<RegionPos, RegionFileFactory, RegionPosCodec>;

pub fn _init_logging() {
    //Every test in a binary calls this, only the first one wins
    let _ = CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

pub fn _create_cache(dir: &Path) -> Result<DefaultCache, RegionCacheError> {
    _init_logging();

    RegionCacheBuilder::new()
        .root(dir)
        .sector_size(256)
        .build_default(RegionPosCodec::new("ext"))
}
