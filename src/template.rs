use crate::color::ColorId;
use serde::Serialize;
use tera::{Context, Tera};

include!(concat!(env!("OUT_DIR"), "/embedded_templates.rs"));

/// Values substituted into the shell rc.
#[derive(Debug, Clone, Serialize)]
pub struct ShellVars {
    pub plugin_dir: String,
    pub runtime_prefix: String,
    pub runtime_env: String,
}

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load the templates compiled into the binary.
    pub fn embedded() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn render_zshrc(&self, vars: &ShellVars) -> anyhow::Result<String> {
        let context = Context::from_serialize(vars)?;
        Ok(self.tera.render("zshrc", &context)?)
    }

    pub fn render_p10k(&self, os_icon_color: ColorId) -> anyhow::Result<String> {
        let mut context = Context::new();
        context.insert("os_icon_color", &os_icon_color.0);
        Ok(self.tera.render("p10k.zsh", &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zshrc_sources_plugins_and_runtime() {
        let engine = TemplateEngine::embedded().unwrap();
        let rc = engine
            .render_zshrc(&ShellVars {
                plugin_dir: "/home/alice/.zsh".into(),
                runtime_prefix: "/home/alice/toolchain/miniconda3".into(),
                runtime_env: "py12".into(),
            })
            .unwrap();
        assert!(rc.contains("source \"/home/alice/.zsh/powerlevel10k/powerlevel10k.zsh-theme\"\n"));
        assert!(rc.contains(
            "source \"/home/alice/.zsh/zsh-syntax-highlighting/zsh-syntax-highlighting.zsh\"\n"
        ));
        assert!(rc.contains("/home/alice/toolchain/miniconda3/etc/profile.d/conda.sh"));
        assert!(rc.contains("conda activate py12"));
    }

    #[test]
    fn p10k_carries_the_color() {
        let engine = TemplateEngine::embedded().unwrap();
        let p10k = engine.render_p10k(ColorId(202)).unwrap();
        assert!(p10k.contains("typeset -g POWERLEVEL9K_OS_ICON_FOREGROUND=202\n"));
        // Raw blocks pass zsh syntax through untouched.
        assert!(p10k.contains("%D{%H:%M:%S}"));
    }
}
