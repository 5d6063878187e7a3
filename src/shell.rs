//! Shell integration source.
//!
//! A child process cannot change its parent's environment, so `kc`/`kn` and
//! friends are shell functions: they run the binary, then evaluate the
//! output of `kubesess env <shell>` in the calling shell.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::resolver::Selection;

pub const CONTEXT_VAR: &str = "KUBESESS_CONTEXT";
pub const NAMESPACE_VAR: &str = "KUBESESS_NAMESPACE";

/// Shells we generate integration code for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

impl Shell {
    pub fn all() -> [Shell; 4] {
        [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::Powershell]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::Powershell => "powershell",
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shell {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bash" => Ok(Self::Bash),
            "zsh" => Ok(Self::Zsh),
            "fish" => Ok(Self::Fish),
            "powershell" | "pwsh" => Ok(Self::Powershell),
            _ => Err(Error::UnsupportedShell {
                name: s.to_string(),
            }),
        }
    }
}

/// Integration source to be evaluated by `shell` at startup
pub fn init_script(shell: Shell) -> String {
    match shell {
        Shell::Bash => format!(
            "{}{}{}{}",
            posix_header("bash", ".bashrc"),
            POSIX_FUNCTIONS,
            BASH_COMPLETIONS,
            posix_footer("bash")
        ),
        Shell::Zsh => format!(
            "{}{}{}{}",
            posix_header("zsh", ".zshrc"),
            POSIX_FUNCTIONS,
            ZSH_COMPLETIONS,
            posix_footer("zsh")
        ),
        Shell::Fish => FISH_INIT.to_string(),
        Shell::Powershell => POWERSHELL_INIT.to_string(),
    }
}

/// Statements that export the selection into the calling shell
pub fn env_script(shell: Shell, selection: &Selection) -> String {
    let mut out = String::new();
    for (var, value) in [
        (CONTEXT_VAR, selection.context()),
        (NAMESPACE_VAR, selection.namespace()),
    ] {
        let line = match (shell, value) {
            (Shell::Bash | Shell::Zsh, Some(v)) => format!("export {}={}", var, quote_posix(v)),
            (Shell::Bash | Shell::Zsh, None) => format!("unset {}", var),
            (Shell::Fish, Some(v)) => format!("set -gx {} {}", var, quote_fish(v)),
            (Shell::Fish, None) => format!("set -e {}", var),
            (Shell::Powershell, Some(v)) => format!("$env:{} = {}", var, quote_powershell(v)),
            (Shell::Powershell, None) => format!(
                "Remove-Item Env:{} -ErrorAction SilentlyContinue",
                var
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn quote_posix(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_fish(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn posix_header(shell: &str, rc: &str) -> String {
    format!(
        "# kubesess shell integration for {shell}\n# Add to your ~/{rc}:\n#   eval \"$(kubesess init {shell})\"\n\n"
    )
}

fn posix_footer(shell: &str) -> String {
    format!("\n# Pick up the selection persisted by other shells\neval \"$(command kubesess env {shell} 2>/dev/null)\"\n")
}

const POSIX_FUNCTIONS: &str = r#"__kubesess_switch() {
  command kubesess "$@" || return $?
  eval "$(command kubesess env "${__KUBESESS_SHELL:-bash}")"
}

kc() {
  __kubesess_switch context "$@"
}

kcd() {
  if [ $# -gt 0 ]; then
    echo "kcd: takes no arguments" >&2
    return 2
  fi
  __kubesess_switch context --default
}

kn() {
  __kubesess_switch namespace "$@"
}

knd() {
  if [ $# -gt 0 ]; then
    echo "knd: takes no arguments" >&2
    return 2
  fi
  __kubesess_switch namespace --default
}

kubectl() {
  local -a __kubesess_args
  __kubesess_args=()
  if [ -n "$KUBESESS_CONTEXT" ]; then
    __kubesess_args+=(--context "$KUBESESS_CONTEXT")
  fi
  if [ -n "$KUBESESS_NAMESPACE" ]; then
    __kubesess_args+=(--namespace "$KUBESESS_NAMESPACE")
  fi
  command kubectl "${__kubesess_args[@]}" "$@"
}
"#;

const BASH_COMPLETIONS: &str = r#"
__KUBESESS_SHELL=bash

_kubesess_complete_contexts() {
  COMPREPLY=($(compgen -W "$(command kubesess list contexts 2>/dev/null)" -- "${COMP_WORDS[COMP_CWORD]}"))
}

_kubesess_complete_namespaces() {
  COMPREPLY=($(compgen -W "$(command kubesess list namespaces 2>/dev/null)" -- "${COMP_WORDS[COMP_CWORD]}"))
}

complete -F _kubesess_complete_contexts kc
complete -F _kubesess_complete_namespaces kn
"#;

const ZSH_COMPLETIONS: &str = r#"
__KUBESESS_SHELL=zsh

if (( $+functions[compdef] )); then
  _kubesess_complete_contexts() {
    compadd -- ${(f)"$(command kubesess list contexts 2>/dev/null)"}
  }

  _kubesess_complete_namespaces() {
    compadd -- ${(f)"$(command kubesess list namespaces 2>/dev/null)"}
  }

  compdef _kubesess_complete_contexts kc
  compdef _kubesess_complete_namespaces kn
fi
"#;

const FISH_INIT: &str = r#"# kubesess shell integration for fish
# Add to your config.fish:
#   kubesess init fish | source

function __kubesess_switch
    command kubesess $argv; or return $status
    command kubesess env fish | source
end

function kc --description "Switch kubernetes context"
    __kubesess_switch context $argv
end

function kcd --description "Switch to the kubeconfig's current-context"
    if test (count $argv) -gt 0
        echo "kcd: takes no arguments" >&2
        return 2
    end
    __kubesess_switch context --default
end

function kn --description "Switch kubernetes namespace"
    __kubesess_switch namespace $argv
end

function knd --description "Switch to the context's default namespace"
    if test (count $argv) -gt 0
        echo "knd: takes no arguments" >&2
        return 2
    end
    __kubesess_switch namespace --default
end

function kubectl --wraps kubectl
    set -l kubesess_args
    if test -n "$KUBESESS_CONTEXT"
        set -a kubesess_args --context $KUBESESS_CONTEXT
    end
    if test -n "$KUBESESS_NAMESPACE"
        set -a kubesess_args --namespace $KUBESESS_NAMESPACE
    end
    command kubectl $kubesess_args $argv
end

complete -c kc -f -a '(command kubesess list contexts 2>/dev/null)'
complete -c kn -f -a '(command kubesess list namespaces 2>/dev/null)'

# Pick up the selection persisted by other shells
command kubesess env fish 2>/dev/null | source
"#;

const POWERSHELL_INIT: &str = r#"# kubesess shell integration for PowerShell
# Add to your PowerShell profile:
#   Invoke-Expression ((& kubesess init powershell) -join "`n")

function Invoke-KubesessSwitch {
    & kubesess @args
    if ($LASTEXITCODE -eq 0) {
        (& kubesess env powershell) -join "`n" | Invoke-Expression
    }
}

function kc {
    param([string]$Context)
    if ($Context) { Invoke-KubesessSwitch context $Context } else { Invoke-KubesessSwitch context }
}

function kcd {
    if ($args.Count -gt 0) {
        Write-Error "kcd: takes no arguments"
        return
    }
    Invoke-KubesessSwitch context --default
}

function kn {
    param([string]$Namespace)
    if ($Namespace) { Invoke-KubesessSwitch namespace $Namespace } else { Invoke-KubesessSwitch namespace }
}

function knd {
    if ($args.Count -gt 0) {
        Write-Error "knd: takes no arguments"
        return
    }
    Invoke-KubesessSwitch namespace --default
}

function kubectl {
    $kubesessArgs = @()
    if ($env:KUBESESS_CONTEXT) { $kubesessArgs += @('--context', $env:KUBESESS_CONTEXT) }
    if ($env:KUBESESS_NAMESPACE) { $kubesessArgs += @('--namespace', $env:KUBESESS_NAMESPACE) }
    $exe = Get-Command kubectl -CommandType Application | Select-Object -First 1
    & $exe @kubesessArgs @args
}

Register-ArgumentCompleter -CommandName kc -ParameterName Context -ScriptBlock {
    param($commandName, $parameterName, $wordToComplete, $commandAst, $fakeBoundParameters)
    kubesess list contexts 2>$null | Where-Object { $_ -like "$wordToComplete*" } | ForEach-Object {
        [System.Management.Automation.CompletionResult]::new($_, $_, 'ParameterValue', $_)
    }
}

Register-ArgumentCompleter -CommandName kn -ParameterName Namespace -ScriptBlock {
    param($commandName, $parameterName, $wordToComplete, $commandAst, $fakeBoundParameters)
    kubesess list namespaces 2>$null | Where-Object { $_ -like "$wordToComplete*" } | ForEach-Object {
        [System.Management.Automation.CompletionResult]::new($_, $_, 'ParameterValue', $_)
    }
}

# Pick up the selection persisted by other shells
(& kubesess env powershell 2>$null) -join "`n" | Invoke-Expression
"#;
