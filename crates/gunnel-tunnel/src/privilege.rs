//! Identity lookup, the feasibility probe and the group-then-user switch.
//!
//! The switch itself goes through [`IdentitySwitch`] so the ordering rule
//! (supplementary groups, then group, then user, each verified) lives in one
//! function, [`assume_identity`], for the probe and the real commitment alike.

use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Gid, Group, Uid, User, fork};
use thiserror::Error;
use tracing::debug;

/// Child exit status of a successful probe.
const PROBE_OK: i32 = 0;
/// Child exit status when the group switch failed.
const PROBE_GROUP_FAILED: i32 = 1;
/// Child exit status when the user switch failed.
const PROBE_USER_FAILED: i32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("invalid group: {0}")]
    InvalidGroup(String),

    #[error("invalid user: {0}")]
    InvalidUser(String),

    #[error("failed to switch to group {0}")]
    GroupTransitionFailed(String),

    #[error("failed to switch to user {0}")]
    UserTransitionFailed(String),

    #[error("identity probe could not run: {0}")]
    Probe(String),
}

impl PrivilegeError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PrivilegeError::InvalidGroup(_) => 5,
            PrivilegeError::InvalidUser(_) => 6,
            PrivilegeError::GroupTransitionFailed(_) => 7,
            PrivilegeError::UserTransitionFailed(_) => 8,
            PrivilegeError::Probe(_) => 12,
        }
    }
}

/// The resolved target identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub uid: Uid,
    pub group: String,
    pub gid: Gid,
}

impl Identity {
    /// Resolve user and group names through the system databases.
    ///
    /// The group is looked up first, matching the order of the switch.
    pub fn lookup(user: &str, group: &str) -> Result<Self, PrivilegeError> {
        let gid = Group::from_name(group)
            .ok()
            .flatten()
            .map(|g| g.gid)
            .ok_or_else(|| PrivilegeError::InvalidGroup(group.to_string()))?;
        let uid = User::from_name(user)
            .ok()
            .flatten()
            .map(|u| u.uid)
            .ok_or_else(|| PrivilegeError::InvalidUser(user.to_string()))?;
        Ok(Self {
            user: user.to_string(),
            uid,
            group: group.to_string(),
            gid,
        })
    }
}

/// The process-identity operations the transition needs.
pub trait IdentitySwitch {
    /// Whether supplementary groups can (and must) be replaced.
    fn is_privileged(&self) -> bool;
    /// Replace the supplementary group list with `gid` alone.
    fn clear_groups(&mut self, gid: Gid) -> nix::Result<()>;
    fn set_group(&mut self, gid: Gid) -> nix::Result<()>;
    fn set_user(&mut self, uid: Uid) -> nix::Result<()>;
    /// Real and effective group both equal `gid`.
    fn holds_group(&self, gid: Gid) -> bool;
    /// Real and effective user both equal `uid`.
    fn holds_user(&self, uid: Uid) -> bool;
}

/// The calling process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl IdentitySwitch for SystemIdentity {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(target_vendor = "apple"))]
    fn clear_groups(&mut self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setgroups(&[gid])
    }

    #[cfg(target_vendor = "apple")]
    fn clear_groups(&mut self, _gid: Gid) -> nix::Result<()> {
        Ok(())
    }

    fn set_group(&mut self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setgid(gid)
    }

    fn set_user(&mut self, uid: Uid) -> nix::Result<()> {
        nix::unistd::setuid(uid)
    }

    fn holds_group(&self, gid: Gid) -> bool {
        nix::unistd::getgid() == gid && nix::unistd::getegid() == gid
    }

    fn holds_user(&self, uid: Uid) -> bool {
        nix::unistd::getuid() == uid && nix::unistd::geteuid() == uid
    }
}

/// Assume `identity`: group first, then user, verifying each step.
///
/// Stops at the first failure, so a failed group switch never reaches the
/// user switch.
pub fn assume_identity<S: IdentitySwitch>(
    switch: &mut S,
    identity: &Identity,
) -> Result<(), PrivilegeError> {
    let group_failed = || PrivilegeError::GroupTransitionFailed(identity.group.clone());
    let user_failed = || PrivilegeError::UserTransitionFailed(identity.user.clone());

    if switch.is_privileged() {
        switch.clear_groups(identity.gid).map_err(|_| group_failed())?;
    }
    switch.set_group(identity.gid).map_err(|_| group_failed())?;
    if !switch.holds_group(identity.gid) {
        return Err(group_failed());
    }

    switch.set_user(identity.uid).map_err(|_| user_failed())?;
    if !switch.holds_user(identity.uid) {
        return Err(user_failed());
    }
    Ok(())
}

/// Check, in a throw-away child process, that `identity` can be assumed.
///
/// The caller's own identity is never touched. Must run while the process
/// is single-threaded (before any async runtime is built).
pub fn probe(identity: &Identity) -> Result<(), PrivilegeError> {
    // SAFETY: the child only issues identity syscalls and `_exit`s, which are
    // async-signal-safe even if other threads exist in the parent.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let status = match assume_identity(&mut SystemIdentity, identity) {
                Ok(()) => PROBE_OK,
                Err(PrivilegeError::GroupTransitionFailed(_)) => PROBE_GROUP_FAILED,
                Err(_) => PROBE_USER_FAILED,
            };
            // SAFETY: terminate the child without running the parent's
            // atexit handlers or flushing its stdio buffers twice.
            unsafe { nix::libc::_exit(status) }
        }
        Ok(ForkResult::Parent { child }) => loop {
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, PROBE_OK)) => {
                    debug!(user = %identity.user, group = %identity.group, "identity probe passed");
                    return Ok(());
                }
                Ok(WaitStatus::Exited(_, PROBE_GROUP_FAILED)) => {
                    return Err(PrivilegeError::InvalidGroup(identity.group.clone()));
                }
                Ok(WaitStatus::Exited(..)) => {
                    return Err(PrivilegeError::InvalidUser(identity.user.clone()));
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Err(PrivilegeError::Probe(format!("probe killed by {:?}", signal)));
                }
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(PrivilegeError::Probe(e.to_string())),
            }
        },
        Err(e) => Err(PrivilegeError::Probe(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        ClearGroups(Gid),
        SetGroup(Gid),
        SetUser(Uid),
    }

    #[derive(Default)]
    struct RecordingSwitch {
        privileged: bool,
        fail_group: bool,
        fail_user: bool,
        ignore_group: bool,
        calls: Vec<Call>,
        gid: Option<Gid>,
        uid: Option<Uid>,
    }

    impl IdentitySwitch for RecordingSwitch {
        fn is_privileged(&self) -> bool {
            self.privileged
        }

        fn clear_groups(&mut self, gid: Gid) -> nix::Result<()> {
            self.calls.push(Call::ClearGroups(gid));
            Ok(())
        }

        fn set_group(&mut self, gid: Gid) -> nix::Result<()> {
            self.calls.push(Call::SetGroup(gid));
            if self.fail_group {
                return Err(Errno::EPERM);
            }
            if !self.ignore_group {
                self.gid = Some(gid);
            }
            Ok(())
        }

        fn set_user(&mut self, uid: Uid) -> nix::Result<()> {
            self.calls.push(Call::SetUser(uid));
            if self.fail_user {
                return Err(Errno::EPERM);
            }
            self.uid = Some(uid);
            Ok(())
        }

        fn holds_group(&self, gid: Gid) -> bool {
            self.gid == Some(gid)
        }

        fn holds_user(&self, uid: Uid) -> bool {
            self.uid == Some(uid)
        }
    }

    fn nobody() -> Identity {
        Identity {
            user: "nobody".into(),
            uid: Uid::from_raw(65534),
            group: "nogroup".into(),
            gid: Gid::from_raw(65534),
        }
    }

    #[test]
    fn test_group_is_switched_before_user() {
        let identity = nobody();
        let mut switch = RecordingSwitch {
            privileged: true,
            ..Default::default()
        };
        assume_identity(&mut switch, &identity).unwrap();
        assert_eq!(
            switch.calls,
            vec![
                Call::ClearGroups(identity.gid),
                Call::SetGroup(identity.gid),
                Call::SetUser(identity.uid),
            ]
        );
    }

    #[test]
    fn test_unprivileged_keeps_supplementary_groups() {
        let identity = nobody();
        let mut switch = RecordingSwitch::default();
        assume_identity(&mut switch, &identity).unwrap();
        assert_eq!(
            switch.calls,
            vec![Call::SetGroup(identity.gid), Call::SetUser(identity.uid)]
        );
    }

    #[test]
    fn test_group_failure_never_reaches_user_switch() {
        let identity = nobody();
        let mut switch = RecordingSwitch {
            fail_group: true,
            ..Default::default()
        };
        let err = assume_identity(&mut switch, &identity).unwrap_err();
        assert_eq!(err, PrivilegeError::GroupTransitionFailed("nogroup".into()));
        assert!(!switch.calls.iter().any(|c| matches!(c, Call::SetUser(_))));
    }

    #[test]
    fn test_unverified_group_switch_is_a_failure() {
        let identity = nobody();
        let mut switch = RecordingSwitch {
            ignore_group: true,
            ..Default::default()
        };
        let err = assume_identity(&mut switch, &identity).unwrap_err();
        assert_eq!(err, PrivilegeError::GroupTransitionFailed("nogroup".into()));
        assert_eq!(switch.calls, vec![Call::SetGroup(identity.gid)]);
    }

    #[test]
    fn test_user_failure() {
        let identity = nobody();
        let mut switch = RecordingSwitch {
            fail_user: true,
            ..Default::default()
        };
        let err = assume_identity(&mut switch, &identity).unwrap_err();
        assert_eq!(err, PrivilegeError::UserTransitionFailed("nobody".into()));
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_lookup_unknown_names() {
        assert_eq!(
            Identity::lookup("root", "gunnel-no-such-group"),
            Err(PrivilegeError::InvalidGroup("gunnel-no-such-group".into()))
        );
        let group = Group::from_gid(nix::unistd::getgid()).unwrap();
        if let Some(group) = group {
            assert_eq!(
                Identity::lookup("gunnel-no-such-user", &group.name),
                Err(PrivilegeError::InvalidUser("gunnel-no-such-user".into()))
            );
        }
    }

    #[test]
    fn test_probe_leaves_caller_identity_untouched() {
        let uid = nix::unistd::getuid();
        let gid = nix::unistd::getgid();
        let (Ok(Some(user)), Ok(Some(group))) = (User::from_uid(uid), Group::from_gid(gid)) else {
            return;
        };

        // Our own identity is always assumable.
        let own = Identity::lookup(&user.name, &group.name).unwrap();
        probe(&own).unwrap();

        // Root can switch to anyone; everyone else must fail in the child.
        let other = Identity {
            uid: Uid::from_raw(uid.as_raw().wrapping_add(4242)),
            gid: Gid::from_raw(gid.as_raw().wrapping_add(4242)),
            ..own.clone()
        };
        let result = probe(&other);
        if uid.is_root() {
            assert!(result.is_ok());
        } else {
            assert_eq!(result, Err(PrivilegeError::InvalidGroup(group.name.clone())));
        }

        assert_eq!(nix::unistd::getuid(), uid);
        assert_eq!(nix::unistd::geteuid(), uid);
        assert_eq!(nix::unistd::getgid(), gid);
    }
}
