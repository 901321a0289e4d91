//! Windows Firewall with Advanced Security backend
//!
//! Implements the native traits over the `INetFwPolicy2` COM API. COM references are released
//! when the wrappers drop, and every `BSTR` and `VARIANT` is owned by a `windows` type that
//! frees it on drop.

use crate::core::error::{NativeError, hresult};
use crate::core::native::{
    Apartment, Cursor, FlagAttribute, IntAttribute, NativeRule, PolicyEngine, PolicyHandle,
    RuleCollection, TextAttribute,
};
use windows::Win32::Foundation::{RPC_E_CHANGED_MODE, S_OK, VARIANT_FALSE, VARIANT_TRUE};
use windows::Win32::NetworkManagement::WindowsFirewall::{
    INetFwPolicy2, INetFwRule, INetFwRules, NET_FW_ACTION, NET_FW_RULE_DIRECTION, NetFwPolicy2,
    NetFwRule,
};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
    CoTaskMemFree, CoUninitialize,
};
use windows::Win32::System::Ole::IEnumVARIANT;
use windows::Win32::System::Variant::{
    InitVariantFromStringArray, VT_DISPATCH, VT_UNKNOWN, VariantToStringArrayAlloc,
};
use windows::core::{BSTR, IUnknown, Interface, PCWSTR, PWSTR, VARIANT};

fn native(err: &windows::core::Error) -> NativeError {
    NativeError::new(err.code().0.cast_unsigned())
}

/// The policy engine of the running host
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsEngine;

impl PolicyEngine for WindowsEngine {
    type Policy = WindowsPolicy;

    fn initialize(&self) -> Result<Apartment, NativeError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            Ok(Apartment::Borrowed)
        } else if hr.is_ok() {
            Ok(Apartment::Entered)
        } else {
            Err(NativeError::new(hr.0.cast_unsigned()))
        }
    }

    fn uninitialize(&self) {
        unsafe { CoUninitialize() };
    }

    fn open_policy(&self) -> Result<WindowsPolicy, NativeError> {
        let policy: INetFwPolicy2 =
            unsafe { CoCreateInstance(&NetFwPolicy2, None, CLSCTX_INPROC_SERVER) }
                .map_err(|e| native(&e))?;
        Ok(WindowsPolicy(policy))
    }
}

pub struct WindowsPolicy(INetFwPolicy2);

impl PolicyHandle for WindowsPolicy {
    type Rules = WindowsRules;

    fn rules(&self) -> Result<WindowsRules, NativeError> {
        unsafe { self.0.Rules() }
            .map(WindowsRules)
            .map_err(|e| native(&e))
    }

    fn current_profile_types(&self) -> Result<i32, NativeError> {
        unsafe { self.0.CurrentProfileTypes() }.map_err(|e| native(&e))
    }

    fn create_rule(&self) -> Result<WindowsRule, NativeError> {
        let rule: INetFwRule = unsafe { CoCreateInstance(&NetFwRule, None, CLSCTX_INPROC_SERVER) }
            .map_err(|e| native(&e))?;
        Ok(WindowsRule(rule))
    }
}

pub struct WindowsRules(INetFwRules);

impl RuleCollection for WindowsRules {
    type Rule = WindowsRule;

    fn count(&self) -> Result<usize, NativeError> {
        let count = unsafe { self.0.Count() }.map_err(|e| native(&e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn cursor(&self) -> Result<Cursor<'_, WindowsRule>, NativeError> {
        let inner = unsafe { self.0._NewEnum() }
            .and_then(|unknown| unknown.cast::<IEnumVARIANT>())
            .map_err(|e| native(&e))?;
        Ok(Box::new(RuleCursor { inner }))
    }

    fn add(&self, rule: &WindowsRule) -> Result<(), NativeError> {
        unsafe { self.0.Add(&rule.0) }.map_err(|e| native(&e))
    }

    fn remove(&self, name: &str) -> Result<(), NativeError> {
        unsafe { self.0.Remove(&BSTR::from(name)) }.map_err(|e| native(&e))
    }

    fn item(&self, name: &str) -> Result<WindowsRule, NativeError> {
        unsafe { self.0.Item(&BSTR::from(name)) }
            .map(WindowsRule)
            .map_err(|e| native(&e))
    }
}

struct RuleCursor {
    inner: IEnumVARIANT,
}

impl Iterator for RuleCursor {
    type Item = Result<WindowsRule, NativeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut slot = [VARIANT::default()];
        let mut fetched = 0u32;
        let hr = unsafe { self.inner.Next(&mut slot, &mut fetched) };
        if hr != S_OK || fetched == 0 {
            if hr.is_err() {
                tracing::debug!("rule enumerator stopped: {hr:?}");
            }
            return None;
        }
        Some(rule_from_variant(&slot[0]).map(WindowsRule))
    }
}

/// Casts one enumerator element to `INetFwRule`; the rule enumerator yields `VT_DISPATCH`
fn rule_from_variant(variant: &VARIANT) -> Result<INetFwRule, NativeError> {
    let raw = variant.as_raw();
    // `pdispVal` and `punkVal` share the same union slot
    let (vt, pointer) = unsafe {
        (
            raw.Anonymous.Anonymous.vt,
            raw.Anonymous.Anonymous.Anonymous.punkVal,
        )
    };
    if vt != VT_DISPATCH.0 && vt != VT_UNKNOWN.0 {
        tracing::debug!("rule enumerator yielded variant type {vt}");
        return Err(NativeError::new(hresult::DISP_E_TYPEMISMATCH));
    }
    // Borrowed from the VARIANT, which still owns its reference; `cast` takes a new one
    unsafe { IUnknown::from_raw_borrowed(&pointer) }
        .ok_or(NativeError::new(hresult::E_NOINTERFACE))?
        .cast::<INetFwRule>()
        .map_err(|e| native(&e))
}

pub struct WindowsRule(INetFwRule);

fn bstr(result: windows::core::Result<BSTR>) -> Result<String, NativeError> {
    result.map(|s| s.to_string()).map_err(|e| native(&e))
}

impl NativeRule for WindowsRule {
    fn text(&self, attr: TextAttribute) -> Result<String, NativeError> {
        let rule = &self.0;
        unsafe {
            match attr {
                TextAttribute::Name => bstr(rule.Name()),
                TextAttribute::Description => bstr(rule.Description()),
                TextAttribute::ApplicationName => bstr(rule.ApplicationName()),
                TextAttribute::ServiceName => bstr(rule.ServiceName()),
                TextAttribute::IcmpTypesAndCodes => bstr(rule.IcmpTypesAndCodes()),
                TextAttribute::LocalPorts => bstr(rule.LocalPorts()),
                TextAttribute::RemotePorts => bstr(rule.RemotePorts()),
                TextAttribute::LocalAddresses => bstr(rule.LocalAddresses()),
                TextAttribute::RemoteAddresses => bstr(rule.RemoteAddresses()),
                TextAttribute::InterfaceTypes => bstr(rule.InterfaceTypes()),
                TextAttribute::Grouping => bstr(rule.Grouping()),
            }
        }
    }

    fn set_text(&self, attr: TextAttribute, value: &str) -> Result<(), NativeError> {
        let rule = &self.0;
        let value = BSTR::from(value);
        unsafe {
            match attr {
                TextAttribute::Name => rule.SetName(&value),
                TextAttribute::Description => rule.SetDescription(&value),
                TextAttribute::ApplicationName => rule.SetApplicationName(&value),
                TextAttribute::ServiceName => rule.SetServiceName(&value),
                TextAttribute::IcmpTypesAndCodes => rule.SetIcmpTypesAndCodes(&value),
                TextAttribute::LocalPorts => rule.SetLocalPorts(&value),
                TextAttribute::RemotePorts => rule.SetRemotePorts(&value),
                TextAttribute::LocalAddresses => rule.SetLocalAddresses(&value),
                TextAttribute::RemoteAddresses => rule.SetRemoteAddresses(&value),
                TextAttribute::InterfaceTypes => rule.SetInterfaceTypes(&value),
                TextAttribute::Grouping => rule.SetGrouping(&value),
            }
        }
        .map_err(|e| native(&e))
    }

    fn int(&self, attr: IntAttribute) -> Result<i32, NativeError> {
        let rule = &self.0;
        unsafe {
            match attr {
                IntAttribute::Protocol => rule.Protocol(),
                IntAttribute::Direction => rule.Direction().map(|d| d.0),
                IntAttribute::Action => rule.Action().map(|a| a.0),
                IntAttribute::Profiles => rule.Profiles(),
            }
        }
        .map_err(|e| native(&e))
    }

    fn set_int(&self, attr: IntAttribute, value: i32) -> Result<(), NativeError> {
        let rule = &self.0;
        unsafe {
            match attr {
                IntAttribute::Protocol => rule.SetProtocol(value),
                IntAttribute::Direction => rule.SetDirection(NET_FW_RULE_DIRECTION(value)),
                IntAttribute::Action => rule.SetAction(NET_FW_ACTION(value)),
                IntAttribute::Profiles => rule.SetProfiles(value),
            }
        }
        .map_err(|e| native(&e))
    }

    fn flag(&self, attr: FlagAttribute) -> Result<bool, NativeError> {
        let rule = &self.0;
        unsafe {
            match attr {
                FlagAttribute::Enabled => rule.Enabled(),
                FlagAttribute::EdgeTraversal => rule.EdgeTraversal(),
            }
        }
        .map(|v| v.0 != 0)
        .map_err(|e| native(&e))
    }

    fn set_flag(&self, attr: FlagAttribute, value: bool) -> Result<(), NativeError> {
        let rule = &self.0;
        let value = if value { VARIANT_TRUE } else { VARIANT_FALSE };
        unsafe {
            match attr {
                FlagAttribute::Enabled => rule.SetEnabled(value),
                FlagAttribute::EdgeTraversal => rule.SetEdgeTraversal(value),
            }
        }
        .map_err(|e| native(&e))
    }

    fn interfaces(&self) -> Result<Vec<String>, NativeError> {
        let variant = unsafe { self.0.Interfaces() }.map_err(|e| native(&e))?;
        if variant.is_empty() {
            return Ok(Vec::new());
        }

        let mut array: *mut PWSTR = std::ptr::null_mut();
        let mut len = 0u32;
        unsafe { VariantToStringArrayAlloc(&variant, &mut array, &mut len) }
            .map_err(|e| native(&e))?;

        let mut out = Vec::with_capacity(len as usize);
        for i in 0..len as usize {
            // Each element and the array itself are CoTaskMem allocations owned by us
            unsafe {
                let element = *array.add(i);
                out.push(element.to_string().unwrap_or_default());
                CoTaskMemFree(Some(element.0 as *const _));
            }
        }
        unsafe { CoTaskMemFree(Some(array as *const _)) };
        Ok(out)
    }

    fn set_interfaces(&self, interfaces: &[String]) -> Result<(), NativeError> {
        let wide: Vec<Vec<u16>> = interfaces
            .iter()
            .map(|s| s.encode_utf16().chain(std::iter::once(0)).collect())
            .collect();
        let pointers: Vec<PCWSTR> = wide.iter().map(|w| PCWSTR(w.as_ptr())).collect();
        let variant = unsafe { InitVariantFromStringArray(&pointers) }.map_err(|e| native(&e))?;
        unsafe { self.0.SetInterfaces(&variant) }.map_err(|e| native(&e))
    }
}
