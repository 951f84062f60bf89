//! Official optional-content packages per title.

use super::Game;

const ME1_DLC: &[&str] = &["DLC_UNC", "DLC_Vegas"];

const ME2_DLC: &[&str] = &[
    "DLC_CER_02",
    "DLC_CER_Arc",
    "DLC_CON_Pack01",
    "DLC_CON_Pack02",
    "DLC_DHME1",
    "DLC_EXP_Part01",
    "DLC_EXP_Part02",
    "DLC_HEN_MT",
    "DLC_HEN_VT",
    "DLC_MCR_01",
    "DLC_MCR_03",
    "DLC_PRE_Cerberus",
    "DLC_PRE_Collectors",
    "DLC_PRE_DA",
    "DLC_PRE_Gamestop",
    "DLC_PRE_General",
    "DLC_PRE_Incisor",
    "DLC_PRO_Gulp01",
    "DLC_PRO_Pepper01",
    "DLC_PRO_Pepper02",
    "DLC_UNC_Hammer01",
    "DLC_UNC_Moment01",
    "DLC_UNC_Pack01",
];

const ME3_DLC: &[&str] = &[
    "DLC_CON_MP1",
    "DLC_CON_MP2",
    "DLC_CON_MP3",
    "DLC_CON_MP4",
    "DLC_CON_MP5",
    "DLC_UPD_Patch01",
    "DLC_UPD_Patch02",
    "DLC_HEN_PR",
    "DLC_CON_END",
    "DLC_EXP_Pack001",
    "DLC_EXP_Pack002",
    "DLC_EXP_Pack003",
    "DLC_EXP_Pack003_Base",
    "DLC_CON_APP01",
    "DLC_CON_GUN01",
    "DLC_CON_GUN02",
    "DLC_CON_DH1",
    "DLC_OnlinePassHidCE",
];

pub(super) fn official(game: Game) -> &'static [&'static str] {
    match game {
        Game::Me1 => ME1_DLC,
        Game::Me2 => ME2_DLC,
        Game::Me3 => ME3_DLC,
    }
}
