use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{NasaError, Result};

/// Placeholder for the image path in command templates.
pub const PATH_PLACEHOLDER: &str = "%s";

/// Known wallpaper commands, selectable by name.
pub const PRESETS: &[(&str, &str)] = &[
    ("gnome", "gsettings set org.gnome.desktop.background picture-uri file://%s"),
    ("kde", "dcop kdesktop KBackgroundIface setWallpaper %s 1"),
    ("gnome2", "gconftool-2 --set /desktop/gnome/background/picture_filename --type=string %s"),
    ("xfce", "xfconf-query -c xfce4-desktop -p /backdrop/screen0/monitor0/image-path -s %s"),
    ("mate", "dconf write /org/mate/desktop/background/picture-filename \"%s\""),
    ("lxde", "pcmanfm -w %s --wallpaper-mode=fit"),
    ("feh", "feh --bg-scale %s"),
    ("setroot", "setroot %s"),
];

pub fn preset(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, template)| *template)
}

/// Applies an image file as the desktop background.
#[async_trait]
pub trait WallpaperSetter: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self, path: &Path) -> Result<()>;
}

/// Runs a command built from a template such as `feh --bg-scale %s`.
#[derive(Debug, Clone)]
pub struct CommandSetter {
    template: String,
}

impl CommandSetter {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.split_whitespace().next().is_none() {
            return Err(NasaError::ConfigInvalid("empty wallpaper command".into()));
        }
        if !template.contains(PATH_PLACEHOLDER) {
            return Err(NasaError::ConfigInvalid(format!(
                "wallpaper command {:?} has no {} placeholder for the image path",
                template, PATH_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// Splits the template on whitespace first so paths with spaces stay one argument.
    pub fn command_line(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.template
            .split_whitespace()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

#[async_trait]
impl WallpaperSetter for CommandSetter {
    fn name(&self) -> &str {
        &self.template
    }

    async fn apply(&self, path: &Path) -> Result<()> {
        ensure_exists(path)?;
        let args = self.command_line(path);
        run(&args).await
    }
}

/// Points the per-user desktop settings at the image through the registry.
#[derive(Debug, Clone, Default)]
pub struct WindowsSetter;

impl WindowsSetter {
    pub fn commands(path: &Path) -> Vec<Vec<String>> {
        let path = path.to_string_lossy().to_string();
        let desktop = r"HKCU\control panel\desktop";
        let general = r"HKCU\Software\Microsoft\Internet Explorer\Desktop\General";
        let cmds: Vec<Vec<&str>> = vec![
            vec!["reg", "add", desktop, "/v", "wallpaper", "/t", "REG_SZ", "/d", "", "/f"],
            vec!["reg", "add", desktop, "/v", "wallpaper", "/t", "REG_SZ", "/d", path.as_str(), "/f"],
            vec!["reg", "delete", general, "/v", "WallpaperStyle", "/f"],
            vec!["reg", "add", desktop, "/v", "WallpaperStyle", "/t", "REG_SZ", "/d", "2", "/f"],
            vec!["RUNDLL32.EXE", "user32.dll,UpdatePerUserSystemParameters"],
        ];
        cmds.into_iter()
            .map(|cmd| cmd.into_iter().map(String::from).collect())
            .collect()
    }
}

#[async_trait]
impl WallpaperSetter for WindowsSetter {
    fn name(&self) -> &str {
        "windows"
    }

    async fn apply(&self, path: &Path) -> Result<()> {
        ensure_exists(path)?;
        for args in Self::commands(path) {
            run(&args).await?;
        }
        Ok(())
    }
}

/// Picks the setter for this platform: an explicit template, then a named
/// preset, then the configured template. Windows needs neither.
pub fn select_setter(
    template: Option<&str>,
    preset_name: Option<&str>,
    configured: Option<&str>,
) -> Result<Box<dyn WallpaperSetter>> {
    if let Some(template) = template {
        return Ok(Box::new(CommandSetter::new(template)?));
    }
    if let Some(name) = preset_name {
        let template = preset(name).ok_or_else(|| {
            let known: Vec<&str> = PRESETS.iter().map(|(name, _)| *name).collect();
            NasaError::ConfigInvalid(format!(
                "unknown wallpaper preset {:?}, expected one of {}",
                name,
                known.join(", ")
            ))
        })?;
        return Ok(Box::new(CommandSetter::new(template)?));
    }
    if let Some(template) = configured {
        return Ok(Box::new(CommandSetter::new(template)?));
    }
    if cfg!(windows) {
        return Ok(Box::new(WindowsSetter));
    }
    Err(NasaError::ConfigInvalid(
        "wallpaper change command not found, set one with --cmd or --cmd-default".into(),
    ))
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(NasaError::SinkFailure(format!(
            "file for new wallpaper does not exist: {}",
            path.display()
        )));
    }
    Ok(())
}

async fn run(args: &[String]) -> Result<()> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| NasaError::SinkFailure("empty wallpaper command".into()))?;
    debug!("Running {} {:?}", program, rest);

    let output = Command::new(program)
        .args(rest)
        .output()
        .await
        .map_err(|e| NasaError::SinkFailure(format!("unable to run {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(NasaError::SinkFailure(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
