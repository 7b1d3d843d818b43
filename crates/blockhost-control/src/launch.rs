//! Launch argument resolution.
//!
//! `server.config` names a runnable asset in `java.jarfile`. Its kind decides
//! which bounds apply and how the command line is built:
//!
//! | asset | kind |
//! | --- | --- |
//! | `*.jar` | [`LaunchKind::Jar`], or [`LaunchKind::UnconventionalJar`] when `minecraft.unconventional` is set |
//! | `*.phar` | [`LaunchKind::Phar`] |
//! | `Cuberite` | [`LaunchKind::Cuberite`] |
//!
//! Every command line is run through `screen -dmS mc-<name>`.

use std::path::Path;

use blockhost_core::ServerName;
use blockhost_store::PropertyDocument;

use crate::error::{ControlError, Result};

const JAVA: &str = "java";
const MINECRAFT: &str = "minecraft";

const PHP7: &str = "./bin/php7/bin/php";
const PHP5: &str = "./bin/php5/bin/php";
const CUBERITE: &str = "Cuberite";

/// Heap sizes and arguments shared by both jar kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaLaunch {
    /// Java launcher.
    pub binary: String,
    /// `-Xmx` in MiB; omitted when zero.
    pub xmx: i64,
    /// `-Xms` in MiB; omitted when zero.
    pub xms: i64,
    /// Extra JVM flags, space-separated.
    pub tweaks: Option<String>,
    /// The jar to run.
    pub jarfile: String,
    /// Arguments after the jar, space-separated.
    pub jar_args: String,
}

/// A resolved way of starting the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchKind {
    /// A vanilla-style server jar. Requires `xmx >= xms > 0`.
    Jar(JavaLaunch),
    /// A jar with non-standard expectations. Requires `xmx >= xms >= 0`.
    UnconventionalJar(JavaLaunch),
    /// A PHP archive run by a bundled interpreter.
    Phar {
        /// Interpreter path relative to the instance directory.
        interpreter: String,
        /// The phar to run.
        pharfile: String,
    },
    /// The Cuberite launcher in the instance directory.
    Cuberite,
}

/// Returns true if `asset` names a PHP archive.
#[must_use]
pub fn is_phar(asset: &str) -> bool {
    ends_with_ignore_case(asset, ".phar")
}

/// Returns true if the configured engine is a PHP archive.
#[must_use]
pub fn config_is_phar(config: &PropertyDocument) -> bool {
    config.get(JAVA, "jarfile").is_some_and(is_phar)
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn split_spaces(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(' ').filter(|p| !p.is_empty()).map(str::to_string)
}

impl LaunchKind {
    /// Resolve the launch kind from `server.config`, checking its bounds.
    ///
    /// `default_java` is consulted only for jar kinds without an explicit
    /// `java.java_binary`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Configuration` if no asset is configured, the
    /// asset kind is unknown, no Java binary is available, or the heap bounds
    /// do not hold.
    pub async fn resolve<F>(
        server: &ServerName,
        config: &PropertyDocument,
        instance_dir: &Path,
        default_java: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Option<String> + Send,
    {
        let jarfile = config
            .get_non_empty(JAVA, "jarfile")
            .ok_or_else(|| {
                ControlError::configuration(
                    server,
                    "cannot start server without a designated jar/phar",
                )
            })?
            .to_string();

        if ends_with_ignore_case(&jarfile, ".jar") {
            let unconventional = config.get_bool(MINECRAFT, "unconventional");
            let binary = config
                .get_non_empty(JAVA, "java_binary")
                .map(str::to_string)
                .or_else(default_java)
                .ok_or_else(|| {
                    ControlError::configuration(server, "no java binary assigned for server")
                })?;
            let xmx = config.get_int(JAVA, "java_xmx").unwrap_or(0);
            let tweaks = config
                .get_non_empty(JAVA, "java_tweaks")
                .map(str::to_string);

            if unconventional {
                let xms = config.get_int(JAVA, "java_xms").unwrap_or(0);
                if xmx < 0 {
                    return Err(ControlError::configuration(
                        server,
                        "XMX heapsize must be positive integer >= 0",
                    ));
                }
                if !(xmx >= xms && xms >= 0) {
                    return Err(ControlError::configuration(
                        server,
                        "XMS heapsize must be positive integer where XMX >= XMS >= 0",
                    ));
                }
                return Ok(Self::UnconventionalJar(JavaLaunch {
                    binary,
                    xmx,
                    xms,
                    tweaks,
                    jarfile,
                    jar_args: config.get(JAVA, "jar_args").unwrap_or("").to_string(),
                }));
            }

            let xms = config
                .get_int(JAVA, "java_xms")
                .filter(|v| *v != 0)
                .unwrap_or(xmx);
            if xmx <= 0 {
                return Err(ControlError::configuration(
                    server,
                    "XMX heapsize must be positive integer > 0",
                ));
            }
            if !(xmx >= xms && xms > 0) {
                return Err(ControlError::configuration(
                    server,
                    "XMS heapsize must be positive integer where XMX >= XMS > 0",
                ));
            }
            return Ok(Self::Jar(JavaLaunch {
                binary,
                xmx,
                xms,
                tweaks,
                jarfile,
                jar_args: config
                    .get_non_empty(JAVA, "jar_args")
                    .unwrap_or("nogui")
                    .to_string(),
            }));
        }

        if is_phar(&jarfile) {
            let php7 = instance_dir.join(PHP7.trim_start_matches("./"));
            let interpreter = if tokio::fs::try_exists(&php7).await.unwrap_or(false) {
                PHP7
            } else {
                PHP5
            };
            return Ok(Self::Phar {
                interpreter: interpreter.to_string(),
                pharfile: jarfile,
            });
        }

        if jarfile == CUBERITE {
            return Ok(Self::Cuberite);
        }

        Err(ControlError::configuration(
            server,
            format!("unrecognised runnable asset: {jarfile}"),
        ))
    }

    /// Returns true for the PHP archive kind.
    #[must_use]
    pub const fn is_phar(&self) -> bool {
        matches!(self, Self::Phar { .. })
    }

    /// The full argument list for the console multiplexer.
    #[must_use]
    pub fn args(&self, server: &ServerName) -> Vec<String> {
        let mut args = vec!["-dmS".to_string(), server.session_name()];

        match self {
            Self::Jar(java) => {
                args.push(java.binary.clone());
                args.push("-server".to_string());
                args.push(format!("-Xmx{}M", java.xmx));
                args.push(format!("-Xms{}M", java.xms));
                java.push_tail(&mut args);
                if starts_with_ignore_case(&java.jarfile, "forge")
                    && ends_with_ignore_case(&java.jarfile, "installer.jar")
                {
                    args.push("--installServer".to_string());
                }
            }
            Self::UnconventionalJar(java) => {
                args.push(java.binary.clone());
                args.push("-server".to_string());
                if java.xmx > 0 {
                    args.push(format!("-Xmx{}M", java.xmx));
                }
                if java.xms > 0 {
                    args.push(format!("-Xms{}M", java.xms));
                }
                java.push_tail(&mut args);
            }
            Self::Phar {
                interpreter,
                pharfile,
            } => {
                args.push(interpreter.clone());
                args.push(pharfile.clone());
            }
            Self::Cuberite => args.push(format!("./{CUBERITE}")),
        }

        args
    }
}

impl JavaLaunch {
    fn push_tail(&self, args: &mut Vec<String>) {
        if let Some(tweaks) = &self.tweaks {
            args.extend(split_spaces(tweaks));
        }
        args.push("-jar".to_string());
        args.push(self.jarfile.clone());
        args.extend(split_spaces(&self.jar_args));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alpha() -> ServerName {
        ServerName::parse("alpha").unwrap()
    }

    fn java() -> Option<String> {
        Some("/usr/bin/java".to_string())
    }

    async fn resolve(config: &str) -> Result<LaunchKind> {
        let dir = TempDir::new().unwrap();
        LaunchKind::resolve(&alpha(), &PropertyDocument::parse(config), dir.path(), java).await
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter().position(|a| a == needle).unwrap()
    }

    #[tokio::test]
    async fn conventional_jar_alpha() {
        let kind = resolve("[java]\njava_xmx=512\njava_xms=256\njarfile=server.jar\n")
            .await
            .unwrap();
        let args = kind.args(&alpha());

        assert_eq!(
            args,
            vec![
                "-dmS",
                "mc-alpha",
                "/usr/bin/java",
                "-server",
                "-Xmx512M",
                "-Xms256M",
                "-jar",
                "server.jar",
                "nogui"
            ]
        );
        assert!(position(&args, "-Xmx512M") < position(&args, "-Xms256M"));
        assert!(position(&args, "-Xms256M") < position(&args, "server.jar"));
    }

    #[tokio::test]
    async fn xms_defaults_to_xmx() {
        let kind = resolve("[java]\njava_xmx=1024\njarfile=server.jar\n")
            .await
            .unwrap();
        assert!(kind.args(&alpha()).contains(&"-Xms1024M".to_string()));
    }

    #[tokio::test]
    async fn heap_bounds_are_enforced() {
        let err = resolve("[java]\njava_xmx=256\njava_xms=512\njarfile=server.jar\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));

        let err = resolve("[java]\njarfile=server.jar\n").await.unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));
    }

    #[tokio::test]
    async fn tweaks_and_args_are_split() {
        let kind = resolve(
            "[java]\njava_xmx=512\njarfile=server.jar\njava_tweaks=-XX:+UseG1GC -Dfoo=bar\njar_args=--port 25570\n",
        )
        .await
        .unwrap();
        let args = kind.args(&alpha());
        let tail: Vec<&str> = args[6..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["-XX:+UseG1GC", "-Dfoo=bar", "-jar", "server.jar", "--port", "25570"]
        );
    }

    #[tokio::test]
    async fn forge_installer_flag() {
        let kind = resolve("[java]\njava_xmx=512\njarfile=forge-1.12.2-installer.jar\n")
            .await
            .unwrap();
        assert_eq!(kind.args(&alpha()).last().unwrap(), "--installServer");

        let kind = resolve("[java]\njava_xmx=512\njarfile=forge-1.12.2-universal.jar\n")
            .await
            .unwrap();
        assert_eq!(kind.args(&alpha()).last().unwrap(), "nogui");
    }

    #[tokio::test]
    async fn unconventional_jar_omits_zero_heap() {
        let kind = resolve("[java]\njarfile=bungee.jar\n\n[minecraft]\nunconventional=true\n")
            .await
            .unwrap();
        assert!(matches!(kind, LaunchKind::UnconventionalJar(_)));
        assert_eq!(
            kind.args(&alpha()),
            vec!["-dmS", "mc-alpha", "/usr/bin/java", "-server", "-jar", "bungee.jar"]
        );

        let err = resolve(
            "[java]\njava_xmx=128\njava_xms=256\njarfile=bungee.jar\n\n[minecraft]\nunconventional=true\n",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));
    }

    #[tokio::test]
    async fn phar_prefers_php7() {
        let dir = TempDir::new().unwrap();
        let config = PropertyDocument::parse("[java]\njarfile=PocketMine-MP.phar\n");

        let kind = LaunchKind::resolve(&alpha(), &config, dir.path(), java)
            .await
            .unwrap();
        assert!(kind.is_phar());
        assert_eq!(
            kind.args(&alpha()),
            vec!["-dmS", "mc-alpha", "./bin/php5/bin/php", "PocketMine-MP.phar"]
        );

        std::fs::create_dir_all(dir.path().join("bin/php7/bin")).unwrap();
        std::fs::write(dir.path().join("bin/php7/bin/php"), "").unwrap();
        let kind = LaunchKind::resolve(&alpha(), &config, dir.path(), java)
            .await
            .unwrap();
        assert_eq!(kind.args(&alpha())[2], "./bin/php7/bin/php");
    }

    #[tokio::test]
    async fn cuberite_and_unknown() {
        let kind = resolve("[java]\njarfile=Cuberite\n").await.unwrap();
        assert_eq!(kind.args(&alpha()), vec!["-dmS", "mc-alpha", "./Cuberite"]);

        let err = resolve("[java]\njarfile=server.exe\n").await.unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));

        let err = resolve("").await.unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));
    }

    #[tokio::test]
    async fn missing_java_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let config = PropertyDocument::parse("[java]\njava_xmx=512\njarfile=server.jar\n");
        let err = LaunchKind::resolve(&alpha(), &config, dir.path(), || None)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Configuration { .. }));

        let config = PropertyDocument::parse(
            "[java]\njava_xmx=512\njarfile=server.jar\njava_binary=/opt/jdk/bin/java\n",
        );
        let kind = LaunchKind::resolve(&alpha(), &config, dir.path(), || None)
            .await
            .unwrap();
        assert_eq!(kind.args(&alpha())[2], "/opt/jdk/bin/java");
    }

    #[test]
    fn phar_detection() {
        assert!(is_phar("PocketMine-MP.PHAR"));
        assert!(!is_phar("server.jar"));
        assert!(config_is_phar(&PropertyDocument::parse(
            "[java]\njarfile=a.phar\n"
        )));
    }
}
