mod asset_index;

pub use asset_index::{
    assets_installed, install_assets, load_or_fetch_index, AssetIndex, AssetObject,
};
