//! Viewer-facing settings stored in the document catalog (ISO 32000-1 Table 28)
//! and the viewer preferences dictionary (Table 150).

use crate::parser::objects::PdfDictionary;
use bitflags::bitflags;

/// Page layout to use when the document is opened (`/PageLayout`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PageLayout {
    /// No `/PageLayout`, or a name this crate does not know
    #[default]
    Unset,
    SinglePage,
    OneColumn,
    TwoColumnLeft,
    TwoColumnRight,
    TwoPageLeft,
    TwoPageRight,
}

impl PageLayout {
    pub fn from_name(name: &str) -> Self {
        match name {
            "SinglePage" => PageLayout::SinglePage,
            "OneColumn" => PageLayout::OneColumn,
            "TwoColumnLeft" => PageLayout::TwoColumnLeft,
            "TwoColumnRight" => PageLayout::TwoColumnRight,
            "TwoPageLeft" => PageLayout::TwoPageLeft,
            "TwoPageRight" => PageLayout::TwoPageRight,
            _ => PageLayout::Unset,
        }
    }

    /// Get the PDF name for this layout
    pub fn pdf_name(&self) -> Option<&'static str> {
        match self {
            PageLayout::Unset => None,
            PageLayout::SinglePage => Some("SinglePage"),
            PageLayout::OneColumn => Some("OneColumn"),
            PageLayout::TwoColumnLeft => Some("TwoColumnLeft"),
            PageLayout::TwoColumnRight => Some("TwoColumnRight"),
            PageLayout::TwoPageLeft => Some("TwoPageLeft"),
            PageLayout::TwoPageRight => Some("TwoPageRight"),
        }
    }

    pub fn from_catalog(catalog: &PdfDictionary) -> Self {
        catalog
            .get_name("PageLayout")
            .map_or(PageLayout::Unset, PageLayout::from_name)
    }
}

/// How the document should be displayed when opened (`/PageMode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PageMode {
    #[default]
    Unset,
    /// Neither outline nor thumbnails visible
    None,
    UseOutlines,
    UseThumbs,
    FullScreen,
    /// Optional content group panel visible
    UseOC,
    UseAttachments,
}

impl PageMode {
    pub fn from_name(name: &str) -> Self {
        match name {
            "UseNone" => PageMode::None,
            "UseOutlines" => PageMode::UseOutlines,
            "UseThumbs" => PageMode::UseThumbs,
            "FullScreen" => PageMode::FullScreen,
            "UseOC" => PageMode::UseOC,
            "UseAttachments" => PageMode::UseAttachments,
            _ => PageMode::Unset,
        }
    }

    pub fn pdf_name(&self) -> Option<&'static str> {
        match self {
            PageMode::Unset => None,
            PageMode::None => Some("UseNone"),
            PageMode::UseOutlines => Some("UseOutlines"),
            PageMode::UseThumbs => Some("UseThumbs"),
            PageMode::FullScreen => Some("FullScreen"),
            PageMode::UseOC => Some("UseOC"),
            PageMode::UseAttachments => Some("UseAttachments"),
        }
    }

    pub fn from_catalog(catalog: &PdfDictionary) -> Self {
        catalog
            .get_name("PageMode")
            .map_or(PageMode::Unset, PageMode::from_name)
    }
}

bitflags! {
    /// Boolean viewer preferences that are turned on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct ViewerPreferences: u32 {
        const HIDE_TOOLBAR = 1 << 0;
        const HIDE_MENUBAR = 1 << 1;
        const HIDE_WINDOW_UI = 1 << 2;
        const FIT_WINDOW = 1 << 3;
        const CENTER_WINDOW = 1 << 4;
        const DISPLAY_DOC_TITLE = 1 << 5;
        /// `/Direction /R2L`
        const DIRECTION_RTL = 1 << 6;
    }
}

const PREFERENCE_KEYS: [(&str, ViewerPreferences); 6] = [
    ("HideToolbar", ViewerPreferences::HIDE_TOOLBAR),
    ("HideMenubar", ViewerPreferences::HIDE_MENUBAR),
    ("HideWindowUI", ViewerPreferences::HIDE_WINDOW_UI),
    ("FitWindow", ViewerPreferences::FIT_WINDOW),
    ("CenterWindow", ViewerPreferences::CENTER_WINDOW),
    ("DisplayDocTitle", ViewerPreferences::DISPLAY_DOC_TITLE),
];

impl ViewerPreferences {
    /// Read a `/ViewerPreferences` dictionary.
    pub fn from_dict(dict: &PdfDictionary) -> Self {
        let mut preferences = ViewerPreferences::empty();
        for (key, flag) in PREFERENCE_KEYS {
            if dict.get_bool(key) == Some(true) {
                preferences |= flag;
            }
        }
        if dict.get_name("Direction") == Some("R2L") {
            preferences |= ViewerPreferences::DIRECTION_RTL;
        }
        preferences
    }
}
