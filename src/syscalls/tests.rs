use super::*;
use crate::config::ProcConfig;
use crate::error::Errno;
use crate::mock::{MockFiles, MockPlatform, MockSpace, MockVnode, SpaceStats};
use crate::platform::Platform;
use crate::proc::{ExitStatus, ProcState};
use core::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn boot_as_kernel() -> (Arc<MockPlatform>, Arc<ProcManager>) {
    let platform = MockPlatform::new();
    let pm = ProcManager::bootstrap(platform.clone(), ProcConfig::default()).unwrap();
    pm.bind_thread(pm.kernel_process(), &platform.current_thread())
        .unwrap();
    (platform, pm)
}

fn frame(number: u64, args: [u64; 3]) -> TrapFrame {
    TrapFrame {
        rax: number,
        rdi: args[0],
        rsi: args[1],
        rdx: args[2],
        ..TrapFrame::default()
    }
}

fn errno(e: Errno) -> u64 {
    (-(e as i64)) as u64
}

/// Child programs exit with whatever the parent left in r12.
fn exit_with_r12(platform: &MockPlatform, pm: &Arc<ProcManager>) {
    let pm = pm.clone();
    platform.set_program(move |tf| {
        sys__exit(&pm, tf.r12 as i32);
    });
}

#[test]
fn getpid_in_kernel_is_zero() {
    let (_platform, pm) = boot_as_kernel();
    assert_eq!(sys_getpid(&pm), 0);
    assert_eq!(dispatch(&pm, &frame(SYS_GETPID, [0; 3])), 0);
}

#[test]
fn getpid_without_process_is_zero() {
    let platform = MockPlatform::new();
    let pm = ProcManager::bootstrap(platform, ProcConfig::default()).unwrap();
    assert_eq!(sys_getpid(&pm), 0);
}

#[test]
fn unknown_syscall_is_enosys() {
    let (_platform, pm) = boot_as_kernel();
    assert_eq!(dispatch(&pm, &frame(77, [0; 3])), errno(Errno::ENOSYS));
    assert_eq!(dispatch(&pm, &frame(77, [0; 3])), u64::MAX);
}

#[test]
fn errors_come_back_negated() {
    assert_eq!(encode(Ok(5)), 5);
    assert_eq!(encode(Err(ProcError::NoSuchChild)) as i64, -16);
    assert_eq!(encode(Err(ProcError::InvalidArgument)) as i64, -8);
    assert_eq!(encode(Err(ProcError::OutOfMemory)) as i64, -3);
}

#[test]
fn fork_and_waitpid_through_dispatch() {
    let (platform, pm) = boot_as_kernel();
    exit_with_r12(&platform, &pm);

    let mut tf = frame(SYS_FORK, [0; 3]);
    tf.r12 = 21;
    let child = dispatch(&pm, &tf);
    assert!(child > 0 && child < 128);

    let ret = dispatch(&pm, &frame(SYS_WAITPID, [child, 0, 0]));
    assert_eq!(ret, child);
    assert_eq!(platform.spawned(), 1);
}

#[test]
fn waitpid_rejects_options_without_blocking() {
    let (platform, pm) = boot_as_kernel();
    let go = Arc::new(AtomicBool::new(false));
    let gate = go.clone();
    let child_pm = pm.clone();
    platform.set_program(move |_tf| {
        while !gate.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        sys__exit(&child_pm, 0);
    });

    let child = sys_fork(&pm, &TrapFrame::default()).unwrap();
    for options in [WaitOptions::WNOHANG, WaitOptions::WUNTRACED] {
        let err = sys_waitpid(&pm, child, UserPtr::NULL, options.bits()).unwrap_err();
        assert_eq!(err, ProcError::InvalidArgument);
    }
    assert_eq!(
        dispatch(&pm, &frame(SYS_WAITPID, [child as u64, 0, 0x40])),
        errno(Errno::EINVAL)
    );

    // The child was not collected by the failed calls.
    assert_eq!(pm.find_process(child).unwrap().state(), ProcState::Running);
    go.store(true, Ordering::SeqCst);
    assert_eq!(sys_waitpid(&pm, child, UserPtr::NULL, 0).unwrap().0, child);
}

#[test]
fn waitpid_on_unknown_pid_is_echild() {
    let (_platform, pm) = boot_as_kernel();
    assert_eq!(
        sys_waitpid(&pm, 99, UserPtr::NULL, 0).unwrap_err(),
        ProcError::NoSuchChild
    );
    assert_eq!(
        dispatch(&pm, &frame(SYS_WAITPID, [99, 0, 0])),
        errno(Errno::ECHILD)
    );
}

#[test]
fn waitpid_null_status_needs_no_address_space() {
    let (platform, pm) = boot_as_kernel();
    exit_with_r12(&platform, &pm);
    let mut tf = TrapFrame::default();
    tf.r12 = 4;
    let child = sys_fork(&pm, &tf).unwrap();
    let (pid, status) = sys_waitpid(&pm, child, UserPtr::NULL, 0).unwrap();
    assert_eq!(pid, child);
    assert_eq!(status, ExitStatus::exited(4));
}

/// Runs `body` inside a user process with a 64-byte address space and
/// returns what it reports.
fn in_user_process<T, F>(platform: &MockPlatform, pm: &Arc<ProcManager>, body: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&Arc<ProcManager>) -> T + Send + 'static,
{
    let stats = SpaceStats::new();
    let proc = pm.create_user_process("user").unwrap();
    pm.link_child(pm.kernel_process(), &proc).unwrap();
    proc.inner.lock().addrspace = Some(MockSpace::new(64, &stats));
    let thread = crate::platform::Thread::new("user");
    pm.bind_thread(&proc, &thread).unwrap();

    let (tx, rx) = mpsc::channel();
    let user_pm = pm.clone();
    platform
        .spawn_thread(
            thread,
            alloc::boxed::Box::new(move || {
                let report = body(&user_pm);
                let _ = tx.send(report);
                sys__exit(&user_pm, 0);
            }),
        )
        .unwrap();
    let report = rx.recv_timeout(TIMEOUT).unwrap();
    pm.wait(proc.pid()).unwrap();
    report
}

#[test]
fn waitpid_copies_status_to_user_memory() {
    let (platform, pm) = boot_as_kernel();
    exit_with_r12(&platform, &pm);
    let (raw, status) = in_user_process(&platform, &pm, |pm| {
        let mut tf = TrapFrame::default();
        tf.r12 = 17;
        let child = sys_fork(pm, &tf).unwrap();
        let at = UserPtr(MockSpace::BASE + 16);
        let (_, status) = sys_waitpid(pm, child, at, 0).unwrap();
        let mut raw = [0u8; 4];
        pm.current_address_space()
            .unwrap()
            .copy_in(at, &mut raw)
            .unwrap();
        (i32::from_ne_bytes(raw), status)
    });
    assert_eq!(raw, status.raw());
    assert_eq!(status.exit_code(), Some(17));
}

#[test]
fn waitpid_fault_still_reaps_child() {
    let (platform, pm) = boot_as_kernel();
    exit_with_r12(&platform, &pm);
    let (first, second) = in_user_process(&platform, &pm, |pm| {
        let child = sys_fork(pm, &TrapFrame::default()).unwrap();
        let first = sys_waitpid(pm, child, UserPtr(0x10), 0).map(|(pid, _)| pid);
        let second = sys_waitpid(pm, child, UserPtr::NULL, 0).map(|(pid, _)| pid);
        (first, second)
    });
    assert_eq!(first, Err(ProcError::BadAddress));
    assert_eq!(second, Err(ProcError::NoSuchChild));
}

#[test]
fn waitpid_on_sibling_is_echild() {
    let (platform, pm) = boot_as_kernel();
    let stranger = pm.create_user_process("stranger").unwrap().pid();
    let result = in_user_process(&platform, &pm, move |pm| {
        sys_waitpid(pm, stranger, UserPtr::NULL, 0).map(|(pid, _)| pid)
    });
    assert_eq!(result, Err(ProcError::NoSuchChild));
}

#[test]
fn forked_child_runs_in_its_own_space() {
    let (platform, pm) = boot_as_kernel();
    let stats = SpaceStats::new();
    let (tx, rx) = mpsc::channel();
    let tx = spin::Mutex::new(tx);
    let child_pm = pm.clone();
    platform.set_program(move |tf| {
        let has_space = child_pm.current_address_space().is_some();
        let _ = tx.lock().send((tf.rax, has_space));
        sys__exit(&child_pm, 0);
    });

    pm.swap_address_space(Some(MockSpace::new(32, &stats)));
    let tf = frame(SYS_FORK, [1, 2, 3]);
    let child = sys_fork(&pm, &tf).unwrap();
    let (rax, has_space) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(rax, 0);
    assert!(has_space);
    assert_eq!(stats.copies.load(Ordering::SeqCst), 1);
    assert!(stats.activations.load(Ordering::SeqCst) >= 1);

    pm.wait(child).unwrap();
    drop(pm.swap_address_space(None));
}

#[test]
fn fork_rolls_back_when_address_space_copy_fails() {
    let (platform, pm) = boot_as_kernel();
    let stats = SpaceStats::new();
    let files = Arc::new(AtomicIsize::new(0));
    let dir = MockVnode::new();
    let kproc = pm.kernel_process().clone();
    pm.install_file_table(&kproc, MockFiles::new(&files));
    pm.set_working_directory(&kproc, Some(dir.reference()));

    let space = MockSpace::new(32, &stats);
    space.fail_next_copy();
    pm.swap_address_space(Some(space));

    let before = pm.list_processes().len();
    assert_eq!(
        sys_fork(&pm, &TrapFrame::default()).unwrap_err(),
        ProcError::OutOfMemory
    );
    assert_eq!(pm.list_processes().len(), before);
    assert_eq!(pm.process_count(), 0);
    assert!(kproc.children().is_empty());
    assert_eq!(stats.live(), 1);
    assert_eq!(files.load(Ordering::SeqCst), 1);
    assert_eq!(dir.refs(), 1);
    assert_eq!(platform.spawned(), 0);
}

#[test]
fn fork_rolls_back_when_thread_cannot_start() {
    let (platform, pm) = boot_as_kernel();
    let stats = SpaceStats::new();
    let files = Arc::new(AtomicIsize::new(0));
    let kproc = pm.kernel_process().clone();
    pm.install_file_table(&kproc, MockFiles::new(&files));
    pm.swap_address_space(Some(MockSpace::new(32, &stats)));

    platform.fail_next_spawn();
    assert_eq!(
        sys_fork(&pm, &TrapFrame::default()).unwrap_err(),
        ProcError::OutOfMemory
    );
    assert_eq!(pm.process_count(), 0);
    assert!(kproc.children().is_empty());
    assert_eq!(stats.live(), 1);
    assert_eq!(files.load(Ordering::SeqCst), 1);

    // The freed PID is handed out again.
    let next = pm.create_user_process("next").unwrap();
    assert_eq!(next.pid(), 1);
}

#[test]
fn fork_reports_full_table() {
    let platform = MockPlatform::new();
    let config = ProcConfig {
        max_procs: 1,
        ..ProcConfig::default()
    };
    let pm = ProcManager::bootstrap(platform.clone(), config).unwrap();
    pm.bind_thread(pm.kernel_process(), &platform.current_thread())
        .unwrap();
    assert_eq!(
        dispatch(&pm, &frame(SYS_FORK, [0; 3])),
        errno(Errno::ENPROC)
    );
}
